//! Content-derived identifiers.
//!
//! Ids are a prefix plus the first 16 hex characters of the SHA-256 of
//! their semantic parts, NUL-separated. Same content, same id, across
//! processes and runs.

use bassline_core::id::{EdgeId, GadgetId, NodeId, WireId};
use bassline_core::ir::Endpoint;
use serde_json::Value;
use sha2::{Digest, Sha256};

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn content_id(prefix: &str, parts: &[&str]) -> String {
    let digest = sha256_hex(parts.join("\0").as_bytes());
    format!("{prefix}{}", &digest[..16])
}

fn endpoint_key(endpoint: &Endpoint) -> String {
    match (&endpoint.slot, &endpoint.gadget) {
        (Some(slot), _) => format!("slot:{slot}.{}", endpoint.pin),
        (None, Some(gadget)) => format!("gadget:{gadget}.{}", endpoint.pin),
        (None, None) => format!("?.{}", endpoint.pin),
    }
}

/// Id for a wire declared without one. `occurrence` tells apart id-less
/// wires between the same endpoints; the first one is 0.
pub(crate) fn wire_id(from: &Endpoint, to: &Endpoint, occurrence: usize) -> WireId {
    let (from, to) = (endpoint_key(from), endpoint_key(to));
    if occurrence == 0 {
        WireId::new(content_id("w_", &[&from, &to]))
    } else {
        WireId::new(content_id("w_", &[&from, &to, &occurrence.to_string()]))
    }
}

/// Id for a gadget node. Template and params are part of the content, so
/// changing either produces a new node.
pub(crate) fn gadget_node_id(gadget: &GadgetId, template: &str, params: &Value) -> NodeId {
    NodeId::new(content_id(
        "n_",
        &["gadget", gadget.as_str(), template, &params.to_string()],
    ))
}

/// Id for an aspect shim on a wire.
pub(crate) fn shim_node_id(wire: &WireId, aspect: &str, params: &Value) -> NodeId {
    NodeId::new(content_id(
        "n_",
        &["shim", wire.as_str(), aspect, &params.to_string()],
    ))
}

pub(crate) fn edge_id(wire: &WireId, from: &NodeId, from_pin: &str, to: &NodeId, to_pin: &str) -> EdgeId {
    EdgeId::new(content_id(
        "e_",
        &[wire.as_str(), from.as_str(), from_pin, to.as_str(), to_pin],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_prefixed_and_short() {
        let id = gadget_node_id(&GadgetId::new("g"), "adder", &Value::Null);
        assert!(id.as_str().starts_with("n_"));
        assert_eq!(id.as_str().len(), 18);
    }

    #[test]
    fn params_change_the_id() {
        let g = GadgetId::new("g");
        assert_ne!(
            gadget_node_id(&g, "t", &json!({"k": 1})),
            gadget_node_id(&g, "t", &json!({"k": 2}))
        );
    }

    #[test]
    fn wire_ids_depend_on_direction() {
        let a = Endpoint::gadget("a", "out");
        let b = Endpoint::gadget("b", "in");
        assert_ne!(wire_id(&a, &b, 0), wire_id(&b, &a, 0));
        assert_ne!(wire_id(&a, &b, 0), wire_id(&a, &b, 1));
    }
}
