//! An adder board with a tapped output wire.
//!
//! Two inputs are set, the adder fires, and its sum travels through a
//! `tap` shim into a display gadget. Set RUST_LOG=debug to see every
//! propagation task.
//!
//! Run with: cargo run --example adder_board -p bassline-runtime

use bassline_aspects::AspectRegistry;
use bassline_core::error::GadgetError;
use bassline_core::gadget::{PinValues, gadget_fn};
use bassline_core::id::GadgetId;
use bassline_core::ir::{AspectInstance, BoardIr, Endpoint, Occupant, Pinout, WireDecl};
use bassline_gadgets::GadgetLibrary;
use bassline_runtime::{GraphExecutor, RuntimeConfig};
use serde_json::{Value, json};
use std::sync::Arc;

fn number(inputs: &PinValues, pin: &str) -> Result<f64, GadgetError> {
    inputs
        .get(pin)
        .and_then(Value::as_f64)
        .ok_or_else(|| GadgetError::Failed(format!("{pin} is not a number")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut library = GadgetLibrary::with_builtin_shims();
    library.register_shared(
        "add",
        gadget_fn(["a", "b"], ["sum"], |inputs, _ctx| {
            let sum = number(inputs, "a")? + number(inputs, "b")?;
            Ok(PinValues::from([("sum".to_string(), json!(sum))]))
        }),
    );

    let ir = BoardIr::new("adder")
        .with_pinout("Add", Pinout::new(["a", "b"], ["sum"]))
        .with_pinout("Display", Pinout::new(["in"], ["out"]))
        .with_slot("math", "Add")
        .with_slot("screen", "Display")
        .with_occupant("math", Occupant::new("add", "add"))
        .with_occupant("screen", Occupant::new("display", "passthrough"))
        .with_wire(
            WireDecl::new(
                "sum-to-screen",
                Endpoint::slot("math", "sum"),
                Endpoint::slot("screen", "in"),
            )
            .with_aspect(AspectInstance::new("tap")),
        );

    let executor = GraphExecutor::new(
        library.clone(),
        Arc::new(AspectRegistry::with_builtins()),
        RuntimeConfig::default(),
    );
    let board = executor.initialize_board(ir).await?;

    let add = GadgetId::new("add");
    for (pin, value) in [("a", 5), ("b", 3)] {
        let contact = board
            .contact_for(&add, pin)
            .await
            .ok_or("adder pin missing")?;
        let report = executor
            .update_contact(board.id(), &contact, json!(value))
            .await?;
        println!(
            "set {pin} = {value}: {} execution(s) in {} round(s)",
            report.executions.len(),
            report.rounds
        );
    }

    let shown = board.pin_value(&GadgetId::new("display"), "out").await?;
    println!("display shows {shown}");
    for record in library.tap_log().records() {
        println!("tap {} saw {}", record.gadget, record.value);
    }

    for receipt in board.receipts().await {
        println!("{}", serde_json::to_string(&receipt)?);
    }

    executor.cleanup(board.id()).await?;
    Ok(())
}
