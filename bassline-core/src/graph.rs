//! The realized graph: the compiled, executable form of a board.
//!
//! Node and edge ids are content-derived by the binder, and every
//! collection is ordered, so two graphs lowered from identical IR
//! serialize to identical bytes. That is what makes [`RealizedGraph::diff`]
//! meaningful across re-lowerings and replays.

use crate::id::{AspectId, EdgeId, GadgetId, NodeId, WireId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Whether a node is a mounted gadget or a synthesized aspect shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A gadget declared as a slot occupant.
    Gadget,
    /// A shim realizing a data-plane aspect on a wire.
    Shim,
}

/// Direction of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinDirection {
    /// Receives values.
    Input,
    /// Emits values.
    Output,
}

/// One pin on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSpec {
    /// Input or output.
    pub direction: PinDirection,
    /// Lattice name; `None` means the runtime default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lattice: Option<String>,
}

impl PinSpec {
    /// An input pin.
    pub fn input(lattice: Option<String>) -> Self {
        Self {
            direction: PinDirection::Input,
            lattice,
        }
    }

    /// An output pin.
    pub fn output(lattice: Option<String>) -> Self {
        Self {
            direction: PinDirection::Output,
            lattice,
        }
    }
}

/// Where a node came from.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NodeProvenance {
    /// Declared as an occupant of a slot.
    Occupant {
        /// The slot.
        slot: String,
    },
    /// Contributed by one aspect instance on a wire.
    Aspect {
        /// The aspect.
        aspect: AspectId,
        /// The wire carrying it.
        wire: WireId,
        /// Position of the instance in the wire's declared aspect list.
        index: usize,
        /// The instance's own params, before composition.
        #[serde(default, skip_serializing_if = "Value::is_null")]
        params: Value,
    },
}

/// A realized node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Content-derived identity.
    pub id: NodeId,
    /// Gadget or shim.
    pub kind: NodeKind,
    /// Gadget-library name to instantiate.
    pub template: String,
    /// Gadget identity, for gadget nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gadget: Option<GadgetId>,
    /// Occupied slot, for gadget nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Wire the shim sits on, for shim nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire: Option<WireId>,
    /// Pin name → direction and lattice.
    pub pins: BTreeMap<String, PinSpec>,
    /// Tags (slot tags, `aspect:<id>`, `join:<point>`).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Construction params; composed aspect params for shims.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    /// One entry per contributing declaration.
    pub prov: Vec<NodeProvenance>,
}

impl Node {
    /// Names of input pins, in order.
    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        self.pins_in(PinDirection::Input)
    }

    /// Names of output pins, in order.
    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.pins_in(PinDirection::Output)
    }

    fn pins_in(&self, direction: PinDirection) -> impl Iterator<Item = &str> {
        self.pins
            .iter()
            .filter(move |(_, spec)| spec.direction == direction)
            .map(|(name, _)| name.as_str())
    }
}

/// A directed pin-to-pin link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Content-derived identity.
    pub id: EdgeId,
    /// Wire this edge realizes.
    pub wire: WireId,
    /// Upstream node.
    pub from: NodeId,
    /// Upstream pin.
    pub from_pin: String,
    /// Downstream node.
    pub to: NodeId,
    /// Downstream pin.
    pub to_pin: String,
    /// Tags (control-plane aspects as `aspect:<id>`).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// One change between two realized graphs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", content = "id", rename_all = "snake_case")]
pub enum GraphDiff {
    /// A node appeared.
    AddNode(NodeId),
    /// A node disappeared.
    RemoveNode(NodeId),
    /// An edge appeared.
    AddEdge(EdgeId),
    /// An edge disappeared.
    RemoveEdge(EdgeId),
}

/// The compiled, executable form of a board.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RealizedGraph {
    /// Nodes by id.
    pub nodes: BTreeMap<NodeId, Node>,
    /// Edges by id.
    pub edges: BTreeMap<EdgeId, Edge>,
    /// Wires not realized yet because a slot endpoint has no occupant.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub deferred: BTreeSet<WireId>,
}

impl RealizedGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// The gadget node for a mounted gadget.
    pub fn gadget_node(&self, gadget: &GadgetId) -> Option<&Node> {
        self.nodes
            .values()
            .find(|n| n.kind == NodeKind::Gadget && n.gadget.as_ref() == Some(gadget))
    }

    /// Shim nodes on a wire, in chain order.
    pub fn shims_on(&self, wire: &WireId) -> Vec<&Node> {
        let mut chain = Vec::new();
        let Some(mut cursor) = self.chain_start(wire) else {
            return chain;
        };
        while let Some(node) = self.nodes.get(&cursor) {
            if node.kind != NodeKind::Shim {
                break;
            }
            chain.push(node);
            match self
                .edges
                .values()
                .find(|e| &e.wire == wire && e.from == cursor)
            {
                Some(next) => cursor = next.to.clone(),
                None => break,
            }
        }
        chain
    }

    fn chain_start(&self, wire: &WireId) -> Option<NodeId> {
        self.edges
            .values()
            .filter(|e| &e.wire == wire)
            .find(|e| {
                self.nodes
                    .get(&e.from)
                    .is_some_and(|n| n.kind == NodeKind::Gadget)
            })
            .map(|e| e.to.clone())
    }

    /// Differences that turn `old` into `new`.
    ///
    /// Edge removals come first, then node removals, node additions and
    /// edge additions; each group is sorted by id.
    pub fn diff(old: &RealizedGraph, new: &RealizedGraph) -> Vec<GraphDiff> {
        let mut diffs = Vec::new();
        diffs.extend(
            old.edges
                .keys()
                .filter(|id| !new.edges.contains_key(*id))
                .cloned()
                .map(GraphDiff::RemoveEdge),
        );
        diffs.extend(
            old.nodes
                .keys()
                .filter(|id| !new.nodes.contains_key(*id))
                .cloned()
                .map(GraphDiff::RemoveNode),
        );
        diffs.extend(
            new.nodes
                .keys()
                .filter(|id| !old.nodes.contains_key(*id))
                .cloned()
                .map(GraphDiff::AddNode),
        );
        diffs.extend(
            new.edges
                .keys()
                .filter(|id| !old.edges.contains_key(*id))
                .cloned()
                .map(GraphDiff::AddEdge),
        );
        diffs
    }
}
