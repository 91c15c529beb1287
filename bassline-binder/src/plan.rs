//! Plans: typed requests to change a board's IR.

use bassline_core::id::{AspectId, GadgetId, WireId};
use bassline_core::ir::{AspectInstance, Endpoint, Occupant, WireDecl};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Which kind of endpoint a [`WireSelector::Shape`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointShape {
    /// A slot endpoint.
    Slot,
    /// A gadget endpoint.
    Gadget,
    /// Either.
    Any,
}

impl EndpointShape {
    fn matches(self, endpoint: &Endpoint) -> bool {
        match self {
            EndpointShape::Slot => endpoint.slot.is_some(),
            EndpointShape::Gadget => endpoint.gadget.is_some(),
            EndpointShape::Any => true,
        }
    }
}

/// Picks wires for [`PlanOp::WeaveWires`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum WireSelector {
    /// Wires carrying this label.
    Tag {
        /// Label to look for.
        tag: String,
    },
    /// Wires whose endpoints have these shapes.
    Shape {
        /// Source shape.
        from: EndpointShape,
        /// Target shape.
        to: EndpointShape,
    },
    /// Wires already carrying this aspect.
    HasAspect {
        /// Aspect to look for.
        aspect: AspectId,
    },
}

impl WireSelector {
    /// Whether `wire` is selected.
    pub fn matches(&self, wire: &WireDecl) -> bool {
        match self {
            WireSelector::Tag { tag } => wire.labels.contains(tag),
            WireSelector::Shape { from, to } => from.matches(&wire.from) && to.matches(&wire.to),
            WireSelector::HasAspect { aspect } => wire.aspects.iter().any(|a| &a.aspect == aspect),
        }
    }
}

/// Field-wise replacement for a wire. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePatch {
    /// New aspect list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspects: Option<Vec<AspectInstance>>,
    /// New labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeSet<String>>,
    /// New policy. `Some(Value::Null)` clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Value>,
}

impl WirePatch {
    pub(crate) fn apply(self, wire: &mut WireDecl) {
        if let Some(aspects) = self.aspects {
            wire.aspects = aspects;
        }
        if let Some(labels) = self.labels {
            wire.labels = labels;
        }
        match self.policy {
            Some(Value::Null) => wire.policy = None,
            Some(policy) => wire.policy = Some(policy),
            None => {}
        }
    }
}

/// One IR mutation.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanOp {
    /// Declare a new wire.
    AddWire {
        /// The wire; an empty id is filled from its endpoints.
        wire: WireDecl,
    },
    /// Patch an existing wire.
    UpdateWire {
        /// Wire to patch.
        id: WireId,
        /// What to change.
        patch: WirePatch,
    },
    /// Attach one aspect to every selected wire.
    WeaveWires {
        /// Which wires.
        selector: WireSelector,
        /// What to attach.
        aspect: AspectInstance,
    },
    /// Remove a wire.
    RemoveWire {
        /// Wire to remove.
        id: WireId,
    },
    /// Add an occupant to a slot.
    MountGadget {
        /// Target slot.
        slot: String,
        /// The gadget.
        occupant: Occupant,
    },
    /// Remove an occupant and every wire naming it directly.
    UnmountGadget {
        /// The gadget.
        gadget: GadgetId,
    },
}

impl fmt::Display for PlanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOp::AddWire { wire } if wire.id.is_empty() => write!(f, "add wire"),
            PlanOp::AddWire { wire } => write!(f, "add wire {}", wire.id),
            PlanOp::UpdateWire { id, .. } => write!(f, "update wire {id}"),
            PlanOp::WeaveWires { aspect, .. } => write!(f, "weave {}", aspect.aspect),
            PlanOp::RemoveWire { id } => write!(f, "remove wire {id}"),
            PlanOp::MountGadget { slot, occupant } => {
                write!(f, "mount {} ({}) in {slot}", occupant.id, occupant.template)
            }
            PlanOp::UnmountGadget { gadget } => write!(f, "unmount {gadget}"),
        }
    }
}

/// A mutation plus who asked for it and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// The mutation.
    #[serde(flatten)]
    pub op: PlanOp,
    /// Acting principal. Empty means the binder's default.
    #[serde(default)]
    pub by: String,
    /// Reason recorded on the receipt. Empty means a description of `op`.
    #[serde(default)]
    pub reason: String,
}

impl Plan {
    /// A plan with default principal and reason.
    pub fn new(op: PlanOp) -> Self {
        Self {
            op,
            by: String::new(),
            reason: String::new(),
        }
    }

    /// Set the principal.
    pub fn with_principal(mut self, by: impl Into<String>) -> Self {
        self.by = by.into();
        self
    }

    /// Set the reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// [`PlanOp::AddWire`].
    pub fn add_wire(wire: WireDecl) -> Self {
        Self::new(PlanOp::AddWire { wire })
    }

    /// [`PlanOp::UpdateWire`].
    pub fn update_wire(id: impl Into<WireId>, patch: WirePatch) -> Self {
        Self::new(PlanOp::UpdateWire {
            id: id.into(),
            patch,
        })
    }

    /// [`PlanOp::WeaveWires`].
    pub fn weave(selector: WireSelector, aspect: AspectInstance) -> Self {
        Self::new(PlanOp::WeaveWires { selector, aspect })
    }

    /// [`PlanOp::RemoveWire`].
    pub fn remove_wire(id: impl Into<WireId>) -> Self {
        Self::new(PlanOp::RemoveWire { id: id.into() })
    }

    /// [`PlanOp::MountGadget`].
    pub fn mount(slot: impl Into<String>, occupant: Occupant) -> Self {
        Self::new(PlanOp::MountGadget {
            slot: slot.into(),
            occupant,
        })
    }

    /// [`PlanOp::UnmountGadget`].
    pub fn unmount(gadget: impl Into<GadgetId>) -> Self {
        Self::new(PlanOp::UnmountGadget {
            gadget: gadget.into(),
        })
    }
}
