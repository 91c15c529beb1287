//! Lowering: validated IR → realized graph.
//!
//! Lowering is a pure function of the IR and the aspect registry. Every
//! id it produces is content-derived and every collection it fills is
//! ordered, so lowering the same IR twice yields byte-identical graphs.

use crate::ids;
use bassline_aspects::{AspectKind, AspectManifest, AspectRegistry, AspectScope};
use bassline_core::error::BinderError;
use bassline_core::graph::{Edge, Node, NodeKind, NodeProvenance, PinSpec, RealizedGraph};
use bassline_core::id::{AspectId, GadgetId, NodeId};
use bassline_core::ir::{AspectInstance, BoardIr, Endpoint, WireDecl};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub(crate) fn lower(ir: &BoardIr, registry: &AspectRegistry) -> Result<RealizedGraph, BinderError> {
    let mut graph = RealizedGraph::new();
    let mut by_gadget: BTreeMap<&GadgetId, NodeId> = BTreeMap::new();

    for (slot, occupants) in &ir.occupants {
        let decl = ir
            .slots
            .get(slot)
            .ok_or_else(|| BinderError::Validation(format!("unknown slot {slot}")))?;
        let pinout = ir.pinouts.get(&decl.requires).ok_or_else(|| {
            BinderError::Validation(format!("unknown pinout {}", decl.requires))
        })?;
        for occupant in occupants {
            let id = ids::gadget_node_id(&occupant.id, &occupant.template, &occupant.params);
            let mut pins = BTreeMap::new();
            for pin in &pinout.inputs {
                pins.insert(pin.clone(), PinSpec::input(pinout.lattices.get(pin).cloned()));
            }
            for pin in &pinout.outputs {
                pins.insert(pin.clone(), PinSpec::output(pinout.lattices.get(pin).cloned()));
            }
            graph.nodes.insert(
                id.clone(),
                Node {
                    id: id.clone(),
                    kind: NodeKind::Gadget,
                    template: occupant.template.clone(),
                    gadget: Some(occupant.id.clone()),
                    slot: Some(slot.clone()),
                    wire: None,
                    pins,
                    tags: decl.tags.clone(),
                    params: occupant.params.clone(),
                    prov: vec![NodeProvenance::Occupant { slot: slot.clone() }],
                },
            );
            by_gadget.insert(&occupant.id, id);
        }
    }

    for wire in &ir.wires {
        let from = resolve(ir, &by_gadget, &wire.from);
        let to = resolve(ir, &by_gadget, &wire.to);
        let (Some(from), Some(to)) = (from, to) else {
            tracing::debug!(wire = %wire.id, "bassline.binder.wire_deferred");
            graph.deferred.insert(wire.id.clone());
            continue;
        };
        lower_wire(&mut graph, registry, wire, from, to)?;
    }

    Ok(graph)
}

/// The node an endpoint lands on. `None` for a slot with no occupant.
fn resolve(
    ir: &BoardIr,
    by_gadget: &BTreeMap<&GadgetId, NodeId>,
    endpoint: &Endpoint,
) -> Option<NodeId> {
    match (&endpoint.gadget, &endpoint.slot) {
        (Some(gadget), _) => by_gadget.get(gadget).cloned(),
        (None, Some(slot)) => {
            let first = ir.occupants.get(slot)?.first()?;
            by_gadget.get(&first.id).cloned()
        }
        (None, None) => None,
    }
}

fn lower_wire(
    graph: &mut RealizedGraph,
    registry: &AspectRegistry,
    wire: &WireDecl,
    from: NodeId,
    to: NodeId,
) -> Result<(), BinderError> {
    let lattice = graph
        .nodes
        .get(&from)
        .and_then(|n| n.pins.get(&wire.from.pin))
        .and_then(|p| p.lattice.clone());

    let mut manifests: BTreeMap<AspectId, Arc<AspectManifest>> = BTreeMap::new();
    for instance in &wire.aspects {
        let manifest = registry.get(&instance.aspect).ok_or_else(|| {
            BinderError::Composition(format!(
                "unknown aspect {} on wire {}",
                instance.aspect, wire.id
            ))
        })?;
        if !manifest.allows(AspectScope::Wire) {
            return Err(BinderError::Composition(format!(
                "aspect {} cannot be attached to wire {}",
                instance.aspect, wire.id
            )));
        }
        manifests.insert(instance.aspect.clone(), manifest);
    }

    let mut order: Vec<AspectId> = manifests.keys().cloned().collect();
    let compat = registry.check_compatibility(&order);
    if !compat.compatible {
        return Err(BinderError::Incompatible {
            wire: wire.id.to_string(),
            reason: compat.reason.unwrap_or_default(),
        });
    }
    registry.sort_canonically(&mut order);

    let mut edge_tags = BTreeSet::new();
    let mut shims: Vec<Node> = Vec::new();
    for aspect in &order {
        let Some(manifest) = manifests.get(aspect) else {
            continue;
        };
        let group: Vec<(usize, &AspectInstance)> = wire
            .aspects
            .iter()
            .enumerate()
            .filter(|(_, a)| &a.aspect == aspect)
            .collect();

        let (join_point, shim) = match &manifest.kind {
            AspectKind::ControlPlane => {
                edge_tags.insert(format!("aspect:{aspect}"));
                continue;
            }
            AspectKind::DataPlane { join_point, shim } => (*join_point, shim),
        };

        // A lone instance lowers as declared; only groups are composed.
        let (params, contributors) = if let [(_, instance)] = group.as_slice() {
            (instance.params.clone(), vec![0])
        } else {
            let instances: Vec<AspectInstance> = group.iter().map(|(_, a)| (*a).clone()).collect();
            let Some(composed) = registry.compose(manifest, &instances) else {
                tracing::warn!(wire = %wire.id, aspect = %aspect, "bassline.binder.aspect_dropped");
                continue;
            };
            for (local, reason) in &composed.dropped {
                tracing::warn!(
                    wire = %wire.id,
                    aspect = %aspect,
                    index = group[*local].0,
                    reason = %reason,
                    "bassline.binder.instance_dropped"
                );
            }
            (composed.params, composed.contributors)
        };

        let id = ids::shim_node_id(&wire.id, aspect.as_str(), &params);
        let prov = contributors
            .iter()
            .map(|&local| {
                let (index, instance) = group[local];
                NodeProvenance::Aspect {
                    aspect: aspect.clone(),
                    wire: wire.id.clone(),
                    index,
                    params: instance.params.clone(),
                }
            })
            .collect();
        shims.push(Node {
            id,
            kind: NodeKind::Shim,
            template: shim.clone(),
            gadget: None,
            slot: None,
            wire: Some(wire.id.clone()),
            pins: BTreeMap::from([
                ("in".to_string(), PinSpec::input(lattice.clone())),
                ("out".to_string(), PinSpec::output(lattice.clone())),
            ]),
            tags: BTreeSet::from([
                format!("aspect:{aspect}"),
                format!("join:{}", join_point.as_str()),
            ]),
            params,
            prov,
        });
    }

    // Source → shims in canonical order → target. Shims read `in` and
    // write `out`.
    let hops = shims
        .iter()
        .map(|n| (n.id.clone(), "in".to_string()))
        .chain(std::iter::once((to, wire.to.pin.clone())));
    let (mut prev, mut prev_pin) = (from, wire.from.pin.clone());
    for (node, in_pin) in hops {
        let id = ids::edge_id(&wire.id, &prev, &prev_pin, &node, &in_pin);
        graph.edges.insert(
            id.clone(),
            Edge {
                id,
                wire: wire.id.clone(),
                from: prev,
                from_pin: prev_pin,
                to: node.clone(),
                to_pin: in_pin,
                tags: edge_tags.clone(),
            },
        );
        prev = node;
        prev_pin = "out".to_string();
    }

    for shim in shims {
        graph.nodes.insert(shim.id.clone(), shim);
    }
    Ok(())
}
