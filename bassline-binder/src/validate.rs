use crate::ids;
use bassline_core::error::BinderError;
use bassline_core::id::WireId;
use bassline_core::ir::{BoardIr, Endpoint, Pinout};
use std::collections::BTreeSet;

/// Fill defaults the IR may omit.
pub(crate) fn normalize(ir: &mut BoardIr) {
    let mut taken: BTreeSet<WireId> = ir
        .wires
        .iter()
        .filter(|w| !w.id.is_empty())
        .map(|w| w.id.clone())
        .collect();
    for wire in &mut ir.wires {
        if wire.id.is_empty() {
            let mut occurrence = 0;
            let mut id = ids::wire_id(&wire.from, &wire.to, occurrence);
            while taken.contains(&id) {
                occurrence += 1;
                id = ids::wire_id(&wire.from, &wire.to, occurrence);
            }
            taken.insert(id.clone());
            wire.id = id;
        }
    }
    ir.occupants.retain(|_, occupants| !occupants.is_empty());
}

fn invalid(message: String) -> BinderError {
    BinderError::Validation(message)
}

/// Reject malformed IR. Expects a normalized board.
pub(crate) fn validate(ir: &BoardIr) -> Result<(), BinderError> {
    for (name, slot) in &ir.slots {
        if !ir.pinouts.contains_key(&slot.requires) {
            return Err(invalid(format!(
                "slot {name} requires unknown pinout {}",
                slot.requires
            )));
        }
    }

    let mut gadgets = BTreeSet::new();
    for (slot, occupants) in &ir.occupants {
        if !ir.slots.contains_key(slot) {
            return Err(invalid(format!("occupants declared for unknown slot {slot}")));
        }
        for occupant in occupants {
            if !gadgets.insert(&occupant.id) {
                return Err(invalid(format!("duplicate gadget id {}", occupant.id)));
            }
        }
    }

    let mut wires: BTreeSet<&WireId> = BTreeSet::new();
    for wire in &ir.wires {
        if !wires.insert(&wire.id) {
            return Err(invalid(format!("duplicate wire id {}", wire.id)));
        }
        let from = pinout_of(ir, &wire.id, &wire.from)?;
        if !from.has_output(&wire.from.pin) {
            return Err(invalid(format!(
                "wire {}: {} is not an output pin",
                wire.id, wire.from.pin
            )));
        }
        let to = pinout_of(ir, &wire.id, &wire.to)?;
        if !to.has_input(&wire.to.pin) {
            return Err(invalid(format!(
                "wire {}: {} is not an input pin",
                wire.id, wire.to.pin
            )));
        }
    }

    Ok(())
}

fn pinout_of<'a>(ir: &'a BoardIr, wire: &WireId, endpoint: &Endpoint) -> Result<&'a Pinout, BinderError> {
    let slot = match (&endpoint.slot, &endpoint.gadget) {
        (Some(slot), None) => slot.as_str(),
        (None, Some(gadget)) => match ir.slot_of(gadget) {
            Some((slot, _)) => slot,
            None => return Err(invalid(format!("wire {wire}: unknown gadget {gadget}"))),
        },
        _ => {
            return Err(invalid(format!(
                "wire {wire}: endpoint must name exactly one of slot or gadget"
            )));
        }
    };
    let decl = ir
        .slots
        .get(slot)
        .ok_or_else(|| invalid(format!("wire {wire}: unknown slot {slot}")))?;
    ir.pinouts
        .get(&decl.requires)
        .ok_or_else(|| invalid(format!("wire {wire}: unknown pinout {}", decl.requires)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bassline_core::ir::{Occupant, WireDecl};

    fn board() -> BoardIr {
        BoardIr::new("b")
            .with_pinout("P", Pinout::new(["in"], ["out"]))
            .with_slot("s", "P")
            .with_occupant("s", Occupant::new("g", "passthrough"))
    }

    #[test]
    fn missing_wire_id_is_derived() {
        let mut ir = board().with_wire(WireDecl::new(
            "",
            Endpoint::gadget("g", "out"),
            Endpoint::slot("s", "in"),
        ));
        normalize(&mut ir);
        assert!(ir.wires[0].id.as_str().starts_with("w_"));
        assert!(validate(&ir).is_ok());
    }

    #[test]
    fn twin_wires_without_ids_get_distinct_ids() {
        let twin = || WireDecl::new("", Endpoint::gadget("g", "out"), Endpoint::slot("s", "in"));
        let mut ir = board().with_wire(twin()).with_wire(twin());
        normalize(&mut ir);
        assert_ne!(ir.wires[0].id, ir.wires[1].id);
        assert!(validate(&ir).is_ok());

        // Already-derived ids are stable across later normalizations.
        let ids: Vec<WireId> = ir.wires.iter().map(|w| w.id.clone()).collect();
        normalize(&mut ir);
        assert_eq!(ir.wires.iter().map(|w| w.id.clone()).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn both_slot_and_gadget_is_rejected() {
        let mut from = Endpoint::gadget("g", "out");
        from.slot = Some("s".into());
        let ir = board().with_wire(WireDecl::new("w", from, Endpoint::slot("s", "in")));
        let err = validate(&ir).unwrap_err();
        assert!(err.to_string().contains("exactly one of slot or gadget"));
    }

    #[test]
    fn direction_is_checked() {
        let ir = board().with_wire(WireDecl::new(
            "w",
            Endpoint::gadget("g", "in"),
            Endpoint::slot("s", "in"),
        ));
        assert_eq!(
            validate(&ir).unwrap_err(),
            BinderError::Validation("wire w: in is not an output pin".into())
        );
    }

    #[test]
    fn unknown_pinout_is_rejected() {
        let ir = BoardIr::new("b").with_slot("s", "Nope");
        assert!(validate(&ir).is_err());
    }

    #[test]
    fn duplicate_gadget_across_slots_is_rejected() {
        let ir = board()
            .with_slot("t", "P")
            .with_occupant("t", Occupant::new("g", "passthrough"));
        assert_eq!(
            validate(&ir).unwrap_err(),
            BinderError::Validation("duplicate gadget id g".into())
        );
    }
}
