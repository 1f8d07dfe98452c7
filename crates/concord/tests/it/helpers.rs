use concord::{Document, ExportMode};

/// Sends everything `from` has to `to`.
pub fn sync(from: &mut Document, to: &mut Document) {
    let bytes = from.export(ExportMode::Snapshot).unwrap();
    to.import(&bytes).unwrap();
}

/// Full pairwise exchange until every replica holds every change.
pub fn sync_all(docs: &mut [Document]) {
    for i in 0..docs.len() {
        for j in 0..docs.len() {
            if i != j {
                let bytes = docs[i].export(ExportMode::Snapshot).unwrap();
                docs[j].import(&bytes).unwrap();
            }
        }
    }
}
