//! Board IR: the declared, desired state of one network.
//!
//! Everything here is plain data: maps, lists, strings and JSON values,
//! so an external IR-construction layer can produce it from any format
//! serde understands. Every field except the board id is
//! `#[serde(default)]`, so a partial IR deserializes and the binder
//! fills in the rest.

use crate::id::{AspectId, BoardId, GadgetId, WireId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// The declared state of one board.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoardIr {
    /// Board identity.
    pub id: BoardId,
    /// Slot name → declaration.
    #[serde(default)]
    pub slots: BTreeMap<String, SlotDecl>,
    /// Slot name → gadgets mounted there, in mount order.
    #[serde(default)]
    pub occupants: BTreeMap<String, Vec<Occupant>>,
    /// Declared connections.
    #[serde(default)]
    pub wires: Vec<WireDecl>,
    /// Capability descriptors referenced by slots.
    #[serde(default)]
    pub pinouts: BTreeMap<String, Pinout>,
    /// Optional board-wide policy annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Value>,
    /// Optional board-wide trait annotations.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub traits: BTreeSet<String>,
}

impl BoardIr {
    /// Create an empty board.
    pub fn new(id: impl Into<BoardId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Declare a pinout.
    pub fn with_pinout(mut self, name: impl Into<String>, pinout: Pinout) -> Self {
        self.pinouts.insert(name.into(), pinout);
        self
    }

    /// Declare a slot requiring `pinout`.
    pub fn with_slot(mut self, name: impl Into<String>, pinout: impl Into<String>) -> Self {
        self.slots.insert(name.into(), SlotDecl::new(pinout));
        self
    }

    /// Mount a gadget in a slot.
    pub fn with_occupant(mut self, slot: impl Into<String>, occupant: Occupant) -> Self {
        self.occupants.entry(slot.into()).or_default().push(occupant);
        self
    }

    /// Declare a wire.
    pub fn with_wire(mut self, wire: WireDecl) -> Self {
        self.wires.push(wire);
        self
    }

    /// Find a wire by id.
    pub fn wire(&self, id: &WireId) -> Option<&WireDecl> {
        self.wires.iter().find(|w| &w.id == id)
    }

    /// The slot a gadget occupies, with its position in that slot.
    pub fn slot_of(&self, gadget: &GadgetId) -> Option<(&str, usize)> {
        self.occupants.iter().find_map(|(slot, list)| {
            list.iter()
                .position(|o| &o.id == gadget)
                .map(|index| (slot.as_str(), index))
        })
    }

    /// The occupant record for a gadget.
    pub fn occupant(&self, gadget: &GadgetId) -> Option<&Occupant> {
        self.occupants
            .values()
            .flat_map(|list| list.iter())
            .find(|o| &o.id == gadget)
    }
}

/// A named requirement for a capability.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotDecl {
    /// Name of the pinout this slot requires.
    pub requires: String,
    /// Free-form tags copied onto realized nodes.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl SlotDecl {
    /// A slot requiring `pinout`.
    pub fn new(pinout: impl Into<String>) -> Self {
        Self {
            requires: pinout.into(),
            tags: BTreeSet::new(),
        }
    }
}

/// A gadget mounted in a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occupant {
    /// Instance identity, unique within the board.
    pub id: GadgetId,
    /// Gadget-library name used to instantiate it.
    pub template: String,
    /// Construction params handed to the gadget factory.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Occupant {
    /// An occupant with no params.
    pub fn new(id: impl Into<GadgetId>, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
            params: Value::Null,
        }
    }
}

/// Pin names of a capability, plus optional per-pin lattice names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pinout {
    /// Input pin names.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Output pin names.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Pin → lattice name. Pins not listed use the runtime default.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lattices: BTreeMap<String, String>,
}

impl Pinout {
    /// A pinout with the given inputs and outputs.
    pub fn new<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            lattices: BTreeMap::new(),
        }
    }

    /// Type `pin` with the named lattice.
    pub fn with_lattice(mut self, pin: impl Into<String>, lattice: impl Into<String>) -> Self {
        self.lattices.insert(pin.into(), lattice.into());
        self
    }

    /// Whether `pin` is an input.
    pub fn has_input(&self, pin: &str) -> bool {
        self.inputs.iter().any(|p| p == pin)
    }

    /// Whether `pin` is an output.
    pub fn has_output(&self, pin: &str) -> bool {
        self.outputs.iter().any(|p| p == pin)
    }
}

/// One end of a wire: exactly one of `slot` or `gadget`, plus a pin.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endpoint {
    /// Slot reference; resolves to the slot's first occupant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Direct gadget reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gadget: Option<GadgetId>,
    /// Pin name.
    pub pin: String,
}

impl Endpoint {
    /// An endpoint on a slot.
    pub fn slot(slot: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            slot: Some(slot.into()),
            gadget: None,
            pin: pin.into(),
        }
    }

    /// An endpoint on a specific gadget.
    pub fn gadget(gadget: impl Into<GadgetId>, pin: impl Into<String>) -> Self {
        Self {
            slot: None,
            gadget: Some(gadget.into()),
            pin: pin.into(),
        }
    }
}

/// An aspect applied to a wire with concrete parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectInstance {
    /// Manifest id.
    pub aspect: AspectId,
    /// Parameters, validated against the manifest's schema when composed.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl AspectInstance {
    /// An instance with no params.
    pub fn new(aspect: impl Into<AspectId>) -> Self {
        Self {
            aspect: aspect.into(),
            params: Value::Null,
        }
    }

    /// An instance with params.
    pub fn with_params(aspect: impl Into<AspectId>, params: Value) -> Self {
        Self {
            aspect: aspect.into(),
            params,
        }
    }
}

/// A declared connection between two endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireDecl {
    /// Wire identity; the binder derives one from the endpoints if empty.
    #[serde(default)]
    pub id: WireId,
    /// Source endpoint (an output pin).
    pub from: Endpoint,
    /// Target endpoint (an input pin).
    pub to: Endpoint,
    /// Aspects in declaration order; lowering sorts them canonically.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspects: Vec<AspectInstance>,
    /// Free-form labels, matched by tag selectors.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,
    /// Optional per-wire policy annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Value>,
}

impl WireDecl {
    /// A wire between two endpoints.
    pub fn new(id: impl Into<WireId>, from: Endpoint, to: Endpoint) -> Self {
        Self {
            id: id.into(),
            from,
            to,
            ..Self::default()
        }
    }

    /// Attach an aspect.
    pub fn with_aspect(mut self, aspect: AspectInstance) -> Self {
        self.aspects.push(aspect);
        self
    }

    /// Attach a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_ir_deserializes_with_defaults() {
        let ir: BoardIr = serde_json::from_value(json!({"id": "b1"})).unwrap();
        assert_eq!(ir.id.as_str(), "b1");
        assert!(ir.slots.is_empty());
        assert!(ir.wires.is_empty());
    }

    #[test]
    fn slot_of_finds_position() {
        let ir = BoardIr::new("b")
            .with_occupant("s", Occupant::new("g1", "add"))
            .with_occupant("s", Occupant::new("g2", "add"));
        assert_eq!(ir.slot_of(&GadgetId::new("g2")), Some(("s", 1)));
        assert_eq!(ir.slot_of(&GadgetId::new("g3")), None);
    }
}
