//! Acceptance tests for the protocol crate.
//!
//! Tests cover:
//! - Trait object safety (Arc<dyn Gadget>, Arc<dyn Lattice> are Send + Sync)
//! - Typed ID conversions
//! - Partial IR deserialization
//! - Lattice laws (commutative, associative, idempotent) under proptest
//! - Graph diff ordering
//! - Receipt wire format

use bassline_core::*;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Object Safety
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn _assert_send_sync<T: Send + Sync>() {}

#[test]
fn arc_gadget_is_send_sync() {
    _assert_send_sync::<Arc<dyn Gadget>>();
}

#[test]
fn arc_lattice_is_send_sync() {
    _assert_send_sync::<Arc<dyn Lattice>>();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Typed IDs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn gadget_id_from_str() {
    let id = GadgetId::from("add");
    assert_eq!(id.as_str(), "add");
    assert_eq!(id.to_string(), "add");
}

#[test]
fn typed_ids_serialize_as_plain_strings() {
    let id = WireId::new("w1");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"w1\"");
}

#[test]
fn contact_for_pin_joins_node_and_pin() {
    let contact = ContactId::for_pin(&NodeId::new("n_abc"), "sum");
    assert_eq!(contact.as_str(), "n_abc.sum");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn ir_from_plain_json() {
    let ir: BoardIr = serde_json::from_value(json!({
        "id": "calc",
        "pinouts": {"P": {"inputs": ["a", "b"], "outputs": ["sum"]}},
        "slots": {"math": {"requires": "P"}},
        "occupants": {"math": [{"id": "add", "template": "adder"}]},
        "wires": [{
            "from": {"gadget": "add", "pin": "sum"},
            "to": {"slot": "math", "pin": "a"},
            "aspects": [{"aspect": "tap"}]
        }]
    }))
    .unwrap();

    assert_eq!(ir.slots["math"].requires, "P");
    assert_eq!(ir.occupants["math"][0].template, "adder");
    assert!(ir.wires[0].id.is_empty());
    assert_eq!(ir.wires[0].aspects[0].params, Value::Null);
}

#[test]
fn ir_builder_matches_json_form() {
    let built = BoardIr::new("calc")
        .with_pinout("P", Pinout::new(["a", "b"], ["sum"]))
        .with_slot("math", "P")
        .with_occupant("math", Occupant::new("add", "adder"));
    let json = serde_json::to_value(&built).unwrap();
    let back: BoardIr = serde_json::from_value(json).unwrap();
    assert_eq!(built, back);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lattice laws
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn lattices() -> Vec<Arc<dyn Lattice>> {
    vec![Arc::new(MaxLattice), Arc::new(MinLattice)]
}

fn num() -> impl Strategy<Value = Value> {
    prop_oneof![Just(Value::Null), (-1000i64..1000).prop_map(|n| json!(n))]
}

fn set() -> impl Strategy<Value = Value> {
    prop::collection::vec(0u8..6, 0..5).prop_map(|items| json!(items))
}

proptest! {
    #[test]
    fn numeric_join_is_commutative(a in num(), b in num()) {
        for lattice in lattices() {
            let ab = lattice.join(&a, &b).unwrap();
            let ba = lattice.join(&b, &a).unwrap();
            prop_assert!(lattice.equivalent(&ab, &ba));
        }
    }

    #[test]
    fn numeric_join_is_associative(a in num(), b in num(), c in num()) {
        for lattice in lattices() {
            let left = lattice.join(&lattice.join(&a, &b).unwrap(), &c).unwrap();
            let right = lattice.join(&a, &lattice.join(&b, &c).unwrap()).unwrap();
            prop_assert!(lattice.equivalent(&left, &right));
        }
    }

    #[test]
    fn numeric_join_is_idempotent(a in num()) {
        for lattice in lattices() {
            prop_assert!(lattice.equivalent(&lattice.join(&a, &a).unwrap(), &a));
        }
    }

    #[test]
    fn set_union_laws(a in set(), b in set(), c in set()) {
        let l = SetUnionLattice;
        let ab = l.join(&a, &b).unwrap();
        prop_assert!(l.equivalent(&ab, &l.join(&b, &a).unwrap()));
        prop_assert!(l.equivalent(&l.join(&ab, &c).unwrap(), &l.join(&a, &l.join(&b, &c).unwrap()).unwrap()));
        prop_assert!(l.equivalent(&l.join(&ab, &ab).unwrap(), &ab));
    }

    #[test]
    fn record_join_is_commutative(x in 0i64..500, y in 0i64..500, tag_a in "[a-c]", tag_b in "[a-c]") {
        let l = RecordLattice::new("r").field("rps", Arc::new(MinLattice));
        let a = json!({"rps": x, "tag": tag_a});
        let b = json!({"rps": y, "tag": tag_b});
        prop_assert!(l.equivalent(&l.join(&a, &b).unwrap(), &l.join(&b, &a).unwrap()));
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph diff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn node(id: &str) -> Node {
    Node {
        id: NodeId::new(id),
        kind: NodeKind::Gadget,
        template: "t".into(),
        gadget: Some(GadgetId::new(id)),
        slot: None,
        wire: None,
        pins: BTreeMap::new(),
        tags: Default::default(),
        params: Value::Null,
        prov: vec![],
    }
}

fn edge(id: &str, from: &str, to: &str) -> Edge {
    Edge {
        id: EdgeId::new(id),
        wire: WireId::new("w"),
        from: NodeId::new(from),
        from_pin: "out".into(),
        to: NodeId::new(to),
        to_pin: "in".into(),
        tags: Default::default(),
    }
}

#[test]
fn diff_orders_removals_before_additions() {
    let mut old = RealizedGraph::new();
    old.nodes.insert(NodeId::new("a"), node("a"));
    old.nodes.insert(NodeId::new("b"), node("b"));
    old.edges.insert(EdgeId::new("e1"), edge("e1", "a", "b"));

    let mut new = RealizedGraph::new();
    new.nodes.insert(NodeId::new("a"), node("a"));
    new.nodes.insert(NodeId::new("c"), node("c"));
    new.edges.insert(EdgeId::new("e2"), edge("e2", "a", "c"));

    assert_eq!(
        RealizedGraph::diff(&old, &new),
        vec![
            GraphDiff::RemoveEdge(EdgeId::new("e1")),
            GraphDiff::RemoveNode(NodeId::new("b")),
            GraphDiff::AddNode(NodeId::new("c")),
            GraphDiff::AddEdge(EdgeId::new("e2")),
        ]
    );
}

#[test]
fn diff_of_identical_graphs_is_empty() {
    let mut g = RealizedGraph::new();
    g.nodes.insert(NodeId::new("a"), node("a"));
    assert!(RealizedGraph::diff(&g, &g.clone()).is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Receipts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn receipt_wire_format() {
    let receipt = Receipt::ok(
        ReceiptId::new("b#1"),
        vec![GraphDiff::AddNode(NodeId::new("n_1"))],
        "alice",
        "add wire",
    );
    let json = serde_json::to_value(&receipt).unwrap();
    assert_eq!(json["id"], "b#1");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["diffs"][0], json!({"op": "add_node", "id": "n_1"}));
    assert_eq!(json["prov"]["by"], "alice");
    assert_eq!(json["prov"]["reason"], "add wire");
}

#[test]
fn error_receipt_has_no_diffs() {
    let receipt = Receipt::error(ReceiptId::new("b#2"), "bob", "validation failed: x");
    assert!(!receipt.is_ok());
    assert!(receipt.diffs.is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gadgets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn gadget_fn_processes_inputs() {
    let double = gadget_fn(["x"], ["y"], |inputs, _ctx| {
        let x = inputs["x"].as_i64().unwrap_or_default();
        Ok(PinValues::from([("y".to_string(), json!(x * 2))]))
    });
    let ctx = GadgetContext::new(GadgetId::new("d"), Value::Null);
    let out = double
        .process(PinValues::from([("x".to_string(), json!(21))]), &ctx)
        .await
        .unwrap();
    assert_eq!(out["y"], json!(42));
}

#[test]
fn default_activation_requires_all_inputs() {
    let g = gadget_fn(["a", "b"], ["c"], |_, _| Ok(PinValues::new()));
    let mut inputs = PinValues::from([("a".to_string(), json!(1))]);
    assert!(!g.activation(&inputs));
    inputs.insert("b".into(), Value::Null);
    assert!(!g.activation(&inputs));
    inputs.insert("b".into(), json!(2));
    assert!(g.activation(&inputs));
}
