use crate::helpers::sync;
use concord::{Document, ExpandType, TextDelta};
use serde_json::{json, Value as Json};

fn rich_doc(peer: u64) -> Document {
    let mut doc = Document::with_peer(peer);
    let styles = &mut doc.config_mut().text_style;
    styles.insert("bold", ExpandType::After);
    styles.insert("link", ExpandType::None);
    doc
}

fn delta_json(doc: &mut Document) -> Vec<Json> {
    doc.get_text("text")
        .unwrap()
        .to_delta()
        .iter()
        .map(TextDelta::to_json)
        .collect()
}

#[test]
fn marks_show_up_in_the_delta() {
    let mut doc = rich_doc(1);
    let mut text = doc.get_text("text").unwrap();
    text.insert(0, "Hello world").unwrap();
    text.mark(0, 5, "bold", true).unwrap();
    text.mark(6, 11, "link", "https://example.com").unwrap();
    assert_eq!(
        delta_json(&mut doc),
        vec![
            json!({"insert": "Hello", "attributes": {"bold": true}}),
            json!({"insert": " "}),
            json!({"insert": "world", "attributes": {"link": "https://example.com"}}),
        ]
    );
}

#[test]
fn typing_at_the_edge_follows_expand_rules() {
    let mut doc = rich_doc(1);
    let mut text = doc.get_text("text").unwrap();
    text.insert(0, "ab").unwrap();
    text.mark(0, 2, "bold", true).unwrap();
    text.insert(2, "c").unwrap();
    text.insert(0, "_").unwrap();
    assert_eq!(
        delta_json(&mut doc),
        vec![
            json!({"insert": "_"}),
            json!({"insert": "abc", "attributes": {"bold": true}}),
        ]
    );
}

#[test]
fn concurrent_marks_on_the_same_key_converge() {
    let mut a = rich_doc(1);
    a.get_text("text").unwrap().insert(0, "shared").unwrap();
    let mut b = rich_doc(2);
    sync(&mut a, &mut b);
    a.get_text("text").unwrap().mark(0, 6, "color", "red").unwrap();
    b.get_text("text").unwrap().mark(0, 6, "color", "blue").unwrap();
    sync(&mut a, &mut b);
    sync(&mut b, &mut a);
    let merged = delta_json(&mut a);
    assert_eq!(merged, delta_json(&mut b));
    assert_eq!(merged.len(), 1);
    let color = &merged[0]["attributes"]["color"];
    assert!(color == "red" || color == "blue");
}

#[test]
fn concurrent_insert_inside_bold_range_is_bold() {
    let mut a = rich_doc(1);
    a.get_text("text").unwrap().insert(0, "abcd").unwrap();
    let mut b = rich_doc(2);
    sync(&mut a, &mut b);
    a.get_text("text").unwrap().mark(0, 4, "bold", true).unwrap();
    b.get_text("text").unwrap().insert(2, "X").unwrap();
    sync(&mut a, &mut b);
    sync(&mut b, &mut a);
    assert_eq!(
        delta_json(&mut a),
        vec![json!({"insert": "abXcd", "attributes": {"bold": true}})]
    );
    assert_eq!(delta_json(&mut a), delta_json(&mut b));
}

#[test]
fn apply_delta_then_update() {
    let mut doc = rich_doc(1);
    let mut text = doc.get_text("text").unwrap();
    text.apply_delta(&[TextDelta::Insert {
        insert: "Hello".into(),
        attributes: None,
    }])
    .unwrap();
    text.update("Hello there", Default::default()).unwrap();
    assert_eq!(text.to_string(), "Hello there");
    text.update_by_line("first\nsecond\n").unwrap();
    assert_eq!(text.to_string(), "first\nsecond\n");
}
