use concord::{EphemeralEventTrigger, EphemeralStore, Value};
use std::sync::{Arc, Mutex};

#[test]
fn presence_flows_between_stores() {
    let mut alice = EphemeralStore::new(30_000);
    let mut bob = EphemeralStore::new(30_000);
    let outbox = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let sink = outbox.clone();
    let _sub = alice.subscribe_local_updates(move |bytes| sink.lock().unwrap().push(bytes.to_vec()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let _obs = bob.subscribe(move |e| log.lock().unwrap().push(e.clone()));

    alice.set("alice/cursor", 12);
    alice.set("alice/name", "Alice");
    for bytes in outbox.lock().unwrap().iter() {
        bob.apply(bytes).unwrap();
    }
    assert_eq!(bob.keys(), vec!["alice/cursor".to_string(), "alice/name".to_string()]);
    assert_eq!(bob.get("alice/name"), Some(Value::from("Alice")));

    alice.delete("alice/cursor");
    bob.apply(&alice.encode("alice/cursor")).unwrap();
    assert_eq!(bob.get_all_states().len(), 1);

    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|e| e.by == EphemeralEventTrigger::Import));
    assert_eq!(seen.last().unwrap().removed, vec!["alice/cursor".to_string()]);
}

#[test]
fn malformed_presence_bytes_are_rejected() {
    let mut store = EphemeralStore::new(1_000);
    assert!(store.apply(b"\xff\xff").is_err());
    assert!(store.keys().is_empty());
}
