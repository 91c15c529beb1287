use bassline_contacts::{ContactChange, ContactStore};
use bassline_core::error::ContactError;
use bassline_core::id::{ContactId, WireId};
use bassline_core::lattice::{MaxLattice, SetUnionLattice};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn cid(s: &str) -> ContactId {
    ContactId::new(s)
}

fn store_with(ids: &[&str]) -> ContactStore {
    let mut store = ContactStore::new();
    for id in ids {
        store.register_contact(cid(id), Arc::new(MaxLattice), None).unwrap();
    }
    store
}

// --- Registration ---

#[test]
fn new_contact_starts_at_bottom() {
    let store = store_with(&["a"]);
    assert_eq!(store.get_value(&cid("a")).unwrap(), &json!(null));
    assert_eq!(store.contact(&cid("a")).unwrap().version, 0);
}

#[test]
fn initial_value_is_joined_over_bottom() {
    let mut store = ContactStore::new();
    store
        .register_contact(cid("s"), Arc::new(SetUnionLattice), Some(json!([3, 1, 3])))
        .unwrap();
    assert_eq!(store.get_value(&cid("s")).unwrap(), &json!([1, 3]));
}

#[test]
fn duplicate_registration_fails() {
    let mut store = store_with(&["a"]);
    let err = store
        .register_contact(cid("a"), Arc::new(MaxLattice), None)
        .unwrap_err();
    assert!(matches!(err, ContactError::Duplicate(id) if id == "a"));
}

#[test]
fn unknown_contact_is_not_found() {
    let mut store = ContactStore::new();
    assert!(matches!(
        store.update_value(&cid("ghost"), &json!(1)),
        Err(ContactError::NotFound(_))
    ));
    assert!(store.get_value(&cid("ghost")).is_err());
}

// --- Updates ---

#[test]
fn update_joins_upward() {
    let mut store = store_with(&["a"]);
    assert!(store.update_value(&cid("a"), &json!(7)).unwrap());
    assert!(!store.update_value(&cid("a"), &json!(3)).unwrap());
    assert_eq!(store.get_value(&cid("a")).unwrap(), &json!(7));
    assert_eq!(store.contact(&cid("a")).unwrap().version, 1);
}

#[test]
fn type_mismatch_surfaces_as_lattice_error() {
    let mut store = store_with(&["a"]);
    let err = store.update_value(&cid("a"), &json!("seven")).unwrap_err();
    assert!(matches!(err, ContactError::Lattice { .. }));
    assert_eq!(store.get_value(&cid("a")).unwrap(), &json!(null));
}

// --- Listeners ---

#[test]
fn listeners_fire_on_change_only() {
    let mut store = store_with(&["a"]);
    let seen: Arc<Mutex<Vec<ContactChange>>> = Arc::default();
    let sink = seen.clone();
    store.on_change(move |change| sink.lock().unwrap().push(change.clone()));

    store.update_value(&cid("a"), &json!(5)).unwrap();
    store.update_value(&cid("a"), &json!(5)).unwrap();
    store.update_value(&cid("a"), &json!(5.0)).unwrap();
    store.update_value(&cid("a"), &json!(2)).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].old, json!(null));
    assert_eq!(seen[0].new, json!(5));
    assert_eq!(seen[0].version, 1);
}

#[test]
fn set_reordering_is_not_a_change() {
    let mut store = ContactStore::new();
    store
        .register_contact(cid("s"), Arc::new(SetUnionLattice), Some(json!([1, 2])))
        .unwrap();
    assert!(!store.update_value(&cid("s"), &json!([2, 1])).unwrap());
}

#[test]
fn unsubscribe_stops_delivery() {
    let mut store = store_with(&["a"]);
    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    let sub = store.on_change(move |_| *sink.lock().unwrap() += 1);

    store.update_value(&cid("a"), &json!(1)).unwrap();
    assert!(store.unsubscribe(sub));
    store.update_value(&cid("a"), &json!(2)).unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
    assert!(!store.unsubscribe(sub));
}

// --- Topology ---

#[test]
fn downstream_follows_active_connections() {
    let mut store = store_with(&["a", "b", "c"]);
    let ab = store.add_connection(WireId::new("w1"), cid("a"), cid("b")).unwrap();
    store.add_connection(WireId::new("w2"), cid("a"), cid("c")).unwrap();
    assert_eq!(store.get_downstream_contacts(&cid("a")), vec![cid("b"), cid("c")]);

    store.set_active(&ab, false).unwrap();
    assert_eq!(store.get_downstream_contacts(&cid("a")), vec![cid("c")]);

    store.set_active(&ab, true).unwrap();
    store.disconnect(&ab).unwrap();
    assert_eq!(store.get_downstream_contacts(&cid("a")), vec![cid("c")]);
    assert!(matches!(
        store.disconnect(&ab),
        Err(ContactError::ConnectionNotFound(_))
    ));
}

#[test]
fn connecting_unknown_contact_fails() {
    let mut store = store_with(&["a"]);
    assert!(store
        .add_connection(WireId::new("w"), cid("a"), cid("nope"))
        .is_err());
}

#[test]
fn remove_connection_drops_every_connection_of_the_wire() {
    let mut store = store_with(&["a", "b", "c"]);
    store.add_connection(WireId::new("w"), cid("a"), cid("b")).unwrap();
    store.add_connection(WireId::new("w"), cid("b"), cid("c")).unwrap();
    store.add_connection(WireId::new("x"), cid("a"), cid("c")).unwrap();

    assert_eq!(store.remove_connection(&WireId::new("w")), 2);
    assert_eq!(store.get_downstream_contacts(&cid("a")), vec![cid("c")]);
    assert!(store.get_downstream_contacts(&cid("b")).is_empty());
}

#[test]
fn remove_contact_drops_its_connections() {
    let mut store = store_with(&["a", "b", "c"]);
    let ab = store.add_connection(WireId::new("w1"), cid("a"), cid("b")).unwrap();
    store.add_connection(WireId::new("w2"), cid("b"), cid("c")).unwrap();

    store.remove_contact(&cid("b")).unwrap();
    assert!(!store.contains(&cid("b")));
    assert!(store.connection(&ab).is_none());
    assert!(store.get_downstream_contacts(&cid("a")).is_empty());
    assert_eq!(store.len(), 2);
}
