//! Integration tests for bassline-runtime.

use bassline_aspects::AspectRegistry;
use bassline_binder::{Plan, Rewriter};
use bassline_core::error::{GadgetError, RuntimeError};
use bassline_core::gadget::Gadget;
use bassline_core::id::{BoardId, ContactId, GadgetId, WireId};
use bassline_core::ir::{AspectInstance, BoardIr, Endpoint, Occupant, Pinout, WireDecl};
use bassline_core::receipt::ReceiptStatus;
use bassline_core::test_utils::{Adder, Failing, Increment};
use bassline_gadgets::{ExecutionStatus, GadgetLibrary};
use bassline_runtime::{BoardContext, GraphExecutor, RuntimeConfig};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Shared test helpers
// ============================================================================

fn library() -> GadgetLibrary {
    let mut library = GadgetLibrary::with_builtin_shims();
    library.register("add", |_: &Value| -> Result<Arc<dyn Gadget>, GadgetError> {
        Ok(Arc::new(Adder::new()))
    });
    library.register("inc", |params: &Value| -> Result<Arc<dyn Gadget>, GadgetError> {
        let limit = params.get("limit").and_then(Value::as_i64).unwrap_or(5);
        Ok(Arc::new(Increment::new(limit)))
    });
    library.register("fail", |_: &Value| -> Result<Arc<dyn Gadget>, GadgetError> {
        Ok(Arc::new(Failing::new()))
    });
    library
}

fn executor() -> GraphExecutor {
    GraphExecutor::new(
        library(),
        Arc::new(AspectRegistry::with_builtins()),
        RuntimeConfig::default(),
    )
}

fn adder_board() -> BoardIr {
    BoardIr::new("b")
        .with_pinout("P", Pinout::new(["a", "b"], ["sum"]))
        .with_slot("math", "P")
}

/// `src` and `dst` pass-throughs, optionally wired `src.out → dst.in`.
fn relay_board(aspects: Vec<AspectInstance>) -> BoardIr {
    let mut wire = WireDecl::new("w", Endpoint::gadget("src", "out"), Endpoint::slot("dst", "in"));
    wire.aspects = aspects;
    BoardIr::new("relay")
        .with_pinout("Relay", Pinout::new(["in"], ["out"]))
        .with_slot("first", "Relay")
        .with_slot("dst", "Relay")
        .with_occupant("first", Occupant::new("src", "passthrough"))
        .with_occupant("dst", Occupant::new("sink", "passthrough"))
        .with_wire(wire)
}

async fn pin(board: &BoardContext, gadget: &str, pin: &str) -> ContactId {
    board
        .contact_for(&GadgetId::new(gadget), pin)
        .await
        .unwrap_or_else(|| panic!("no contact for {gadget}.{pin}"))
}

async fn set(executor: &GraphExecutor, board: &BoardContext, gadget: &str, name: &str, value: Value) {
    let contact = pin(board, gadget, name).await;
    executor
        .update_contact(board.id(), &contact, value)
        .await
        .unwrap();
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn adder_converges_to_sum() {
    let executor = executor();
    let board = executor.initialize_board(adder_board()).await.unwrap();
    assert!(board.contact_ids().await.is_empty());

    let outcome = executor
        .mount_gadget(board.id(), "math", "add", "add")
        .await
        .unwrap();
    assert_eq!(outcome.receipt.id.as_str(), "b#2");
    assert_eq!(board.contact_ids().await.len(), 3);

    let a = pin(&board, "add", "a").await;
    let b = pin(&board, "add", "b").await;

    let report = executor.update_contact(board.id(), &a, json!(5)).await.unwrap();
    assert_eq!(report.propagation.values_changed, 1);
    assert_eq!(report.executions.len(), 1);
    assert_eq!(report.executions[0].status, ExecutionStatus::Skipped);

    let report = executor.update_contact(board.id(), &b, json!(3)).await.unwrap();
    assert_eq!(report.completed().count(), 1);
    assert!(report.quiescent);

    let sum = board.pin_value(&GadgetId::new("add"), "sum").await.unwrap();
    assert_eq!(sum, json!(8));

    let stats = board.gadget_stats(&GadgetId::new("add")).await.unwrap();
    assert_eq!(stats.executions, 1);
    assert_eq!(stats.skipped, 1);
}

#[tokio::test]
async fn unknown_template_leaves_board_untouched() {
    let executor = executor();
    let board = executor.initialize_board(adder_board()).await.unwrap();
    executor
        .mount_gadget(board.id(), "math", "add", "add")
        .await
        .unwrap();
    let contacts = board.contact_ids().await;
    let receipts = board.receipts().await.len();

    let err = executor
        .mount_gadget(board.id(), "math", "ghost", "no-such-template")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Gadget(GadgetError::UnknownTemplate(ref name)) if name == "no-such-template"
    ));
    assert_eq!(board.contact_ids().await, contacts);
    assert_eq!(board.receipts().await.len(), receipts);
}

#[tokio::test]
async fn plan_with_unknown_template_is_vetoed() {
    let executor = executor();
    let board = executor.initialize_board(adder_board()).await.unwrap();
    let contacts = board.contact_ids().await;

    let outcome = executor
        .apply_plan(
            board.id(),
            Plan::mount("math", Occupant::new("ghost", "no-such-template")),
        )
        .await
        .unwrap();
    assert_eq!(outcome.receipt.status, ReceiptStatus::Error);
    assert!(outcome.receipt.prov.reason.contains("no-such-template"));
    assert_eq!(board.contact_ids().await, contacts);
    assert!(board.ir().await.occupants.is_empty());
    assert!(board.graph().await.nodes.is_empty());
}

#[tokio::test]
async fn unknown_template_at_initialize_fails() {
    let executor = executor();
    let ir = adder_board().with_occupant("math", Occupant::new("add", "nope"));
    let err = executor.initialize_board(ir).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Gadget(GadgetError::UnknownTemplate(_))));
    assert!(executor.board(&BoardId::new("b")).await.is_none());
}

#[tokio::test]
async fn unmount_collects_contacts_and_keeps_receipts() {
    let executor = executor();
    let board = executor.initialize_board(adder_board()).await.unwrap();
    executor
        .mount_gadget(board.id(), "math", "add", "add")
        .await
        .unwrap();
    set(&executor, &board, "add", "a", json!(1)).await;

    let outcome = executor
        .unmount_gadget(board.id(), &GadgetId::new("add"))
        .await
        .unwrap();
    assert!(outcome.receipt.is_ok());
    assert!(board.contact_ids().await.is_empty());
    assert!(board.contact_for(&GadgetId::new("add"), "a").await.is_none());
    assert!(board.gadget_stats(&GadgetId::new("add")).await.is_none());

    let ids: Vec<String> = board
        .receipts()
        .await
        .iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(ids, vec!["b#1", "b#2", "b#3"]);

    let err = executor
        .unmount_gadget(board.id(), &GadgetId::new("add"))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::GadgetNotFound(_)));
}

#[tokio::test]
async fn remount_starts_from_bottom() {
    let executor = executor();
    let board = executor.initialize_board(adder_board()).await.unwrap();
    executor.mount_gadget(board.id(), "math", "add", "add").await.unwrap();
    set(&executor, &board, "add", "a", json!(9)).await;
    executor
        .unmount_gadget(board.id(), &GadgetId::new("add"))
        .await
        .unwrap();
    executor.mount_gadget(board.id(), "math", "add", "add").await.unwrap();

    let a = board.pin_value(&GadgetId::new("add"), "a").await.unwrap();
    assert_eq!(a, Value::Null);
}

#[tokio::test]
async fn monotone_feedback_loop_converges() {
    let ir = BoardIr::new("loop")
        .with_pinout("Counter", Pinout::new(["in"], ["out"]))
        .with_slot("s", "Counter")
        .with_occupant(
            "s",
            Occupant {
                params: json!({"limit": 5}),
                ..Occupant::new("inc", "inc")
            },
        )
        .with_wire(WireDecl::new(
            "feedback",
            Endpoint::gadget("inc", "out"),
            Endpoint::gadget("inc", "in"),
        ));
    let executor = executor();
    let board = executor.initialize_board(ir).await.unwrap();

    let input = pin(&board, "inc", "in").await;
    let report = executor
        .update_contact(board.id(), &input, json!(0))
        .await
        .unwrap();

    assert!(report.quiescent);
    assert_eq!(report.rounds, 6);
    assert_eq!(board.pin_value(&GadgetId::new("inc"), "out").await.unwrap(), json!(5));
    assert_eq!(board.pin_value(&GadgetId::new("inc"), "in").await.unwrap(), json!(5));
}

#[tokio::test]
async fn round_limit_is_reported_not_fatal() {
    let ir = BoardIr::new("loop")
        .with_pinout("Counter", Pinout::new(["in"], ["out"]))
        .with_slot("s", "Counter")
        .with_occupant(
            "s",
            Occupant {
                params: json!({"limit": 1000}),
                ..Occupant::new("inc", "inc")
            },
        )
        .with_wire(WireDecl::new(
            "feedback",
            Endpoint::gadget("inc", "out"),
            Endpoint::gadget("inc", "in"),
        ));
    let executor = GraphExecutor::new(
        library(),
        Arc::new(AspectRegistry::with_builtins()),
        RuntimeConfig::default().with_max_rounds(3),
    );
    let board = executor.initialize_board(ir).await.unwrap();

    let input = pin(&board, "inc", "in").await;
    let report = executor
        .update_contact(board.id(), &input, json!(0))
        .await
        .unwrap();
    assert!(!report.quiescent);
    assert_eq!(report.rounds, 3);
    assert_eq!(board.pin_value(&GadgetId::new("inc"), "out").await.unwrap(), json!(3));
}

#[tokio::test]
async fn failing_gadget_is_isolated() {
    let ir = adder_board()
        .with_pinout("Relay", Pinout::new(["in"], ["out"]))
        .with_slot("broken", "Relay")
        .with_occupant("broken", Occupant::new("f", "fail"))
        .with_occupant("math", Occupant::new("add", "add"));
    let executor = executor();
    let board = executor.initialize_board(ir).await.unwrap();

    let input = pin(&board, "f", "in").await;
    let report = executor
        .update_contact(board.id(), &input, json!(1))
        .await
        .unwrap();
    assert!(matches!(
        report.executions[0].status,
        ExecutionStatus::Failed { .. }
    ));
    assert_eq!(board.pin_value(&GadgetId::new("f"), "out").await.unwrap(), Value::Null);
    assert_eq!(
        board.gadget_stats(&GadgetId::new("f")).await.unwrap().failures,
        1
    );

    set(&executor, &board, "add", "a", json!(2)).await;
    set(&executor, &board, "add", "b", json!(2)).await;
    assert_eq!(board.pin_value(&GadgetId::new("add"), "sum").await.unwrap(), json!(4));
}

#[tokio::test]
async fn values_flow_through_tap_and_rate_limit_shims() {
    let executor = executor();
    let board = executor
        .initialize_board(relay_board(vec![
            AspectInstance::with_params("rate-limit", json!({"rps": 100})),
            AspectInstance::new("tap"),
        ]))
        .await
        .unwrap();

    let graph = board.graph().await;
    let shims = graph.shims_on(&WireId::new("w"));
    let templates: Vec<&str> = shims.iter().map(|n| n.template.as_str()).collect();
    assert_eq!(templates, vec!["tap", "rate-limit"]);
    assert_eq!(shims[1].params, json!({"rps": 100}));
    let tap = GadgetId::new(shims[0].id.as_str());

    set(&executor, &board, "src", "in", json!(7)).await;
    assert_eq!(board.pin_value(&GadgetId::new("sink"), "out").await.unwrap(), json!(7));
    assert_eq!(executor.library().tap_log().values_for(&tap), vec![json!(7)]);
}

#[tokio::test]
async fn deferred_wire_carries_value_once_mounted() {
    let ir = BoardIr::new("late")
        .with_pinout("Relay", Pinout::new(["in"], ["out"]))
        .with_slot("first", "Relay")
        .with_slot("dst", "Relay")
        .with_occupant("first", Occupant::new("src", "passthrough"))
        .with_wire(WireDecl::new(
            "w",
            Endpoint::gadget("src", "out"),
            Endpoint::slot("dst", "in"),
        ));
    let executor = executor();
    let board = executor.initialize_board(ir).await.unwrap();
    assert!(board.graph().await.deferred.contains(&WireId::new("w")));

    set(&executor, &board, "src", "in", json!(4)).await;
    let outcome = executor
        .mount_gadget(board.id(), "dst", "sink", "passthrough")
        .await
        .unwrap();
    assert!(outcome.report.propagation.values_changed >= 1);
    assert_eq!(board.pin_value(&GadgetId::new("sink"), "out").await.unwrap(), json!(4));
}

#[tokio::test]
async fn rejected_plan_keeps_values() {
    let executor = executor();
    let board = executor.initialize_board(relay_board(vec![])).await.unwrap();
    set(&executor, &board, "src", "in", json!(2)).await;
    let contacts = board.contact_ids().await;
    let graph = board.graph().await;

    let outcome = executor
        .apply_plan(board.id(), Plan::remove_wire("missing"))
        .await
        .unwrap();
    assert_eq!(outcome.receipt.status, ReceiptStatus::Error);
    assert!(outcome.report.executions.is_empty());
    assert_eq!(board.contact_ids().await, contacts);
    assert_eq!(board.graph().await, graph);
    assert_eq!(board.pin_value(&GadgetId::new("sink"), "out").await.unwrap(), json!(2));

    let err = executor
        .mount_gadget(board.id(), "nowhere", "x", "passthrough")
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Rejected(_)));
}

#[tokio::test]
async fn removing_a_wire_disconnects_it() {
    let executor = executor();
    let board = executor.initialize_board(relay_board(vec![])).await.unwrap();
    executor
        .apply_plan(board.id(), Plan::remove_wire("w"))
        .await
        .unwrap();

    set(&executor, &board, "src", "in", json!(3)).await;
    assert_eq!(board.pin_value(&GadgetId::new("src"), "out").await.unwrap(), json!(3));
    assert_eq!(board.pin_value(&GadgetId::new("sink"), "in").await.unwrap(), Value::Null);
}

#[tokio::test]
async fn pin_lattice_comes_from_pinout() {
    let ir = BoardIr::new("low")
        .with_pinout("Relay", Pinout::new(["in"], ["out"]).with_lattice("in", "min"))
        .with_slot("s", "Relay")
        .with_occupant("s", Occupant::new("r", "passthrough"));
    let executor = executor();
    let board = executor.initialize_board(ir).await.unwrap();

    set(&executor, &board, "r", "in", json!(5)).await;
    set(&executor, &board, "r", "in", json!(3)).await;
    set(&executor, &board, "r", "in", json!(4)).await;
    assert_eq!(board.pin_value(&GadgetId::new("r"), "in").await.unwrap(), json!(3));
    // `out` uses the default max lattice.
    assert_eq!(board.pin_value(&GadgetId::new("r"), "out").await.unwrap(), json!(5));
}

#[tokio::test]
async fn execute_gadget_runs_on_current_inputs() {
    let executor = executor();
    let ir = adder_board().with_occupant("math", Occupant::new("add", "add"));
    let board = executor.initialize_board(ir).await.unwrap();

    let report = executor
        .execute_gadget(board.id(), &GadgetId::new("add"))
        .await
        .unwrap();
    assert_eq!(report.executions[0].status, ExecutionStatus::Skipped);

    let err = executor
        .execute_gadget(board.id(), &GadgetId::new("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::GadgetNotFound(_)));
}

#[tokio::test]
async fn change_listeners_see_updates() {
    let executor = executor();
    let board = executor.initialize_board(relay_board(vec![])).await.unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    board
        .on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    set(&executor, &board, "src", "in", json!(1)).await;
    // src.in, src.out, sink.in, sink.out
    assert_eq!(seen.load(Ordering::SeqCst), 4);

    let totals = board.propagation_totals().await;
    assert!(totals.calls >= 3);
}

// ============================================================================
// Rewriters and rejected changes
// ============================================================================

#[tokio::test]
async fn rewriter_plan_with_unknown_template_is_skipped() {
    let executor = executor()
        .with_rewriter(Rewriter::new("ghost", 0, |_: &BoardIr| {
            Ok(vec![Plan::mount("math", Occupant::new("ghost", "no-such-template"))])
        }))
        .with_rewriter(Rewriter::new("mount-add", 1, |_: &BoardIr| {
            Ok(vec![Plan::mount("math", Occupant::new("add", "add"))])
        }));
    let board = executor.initialize_board(adder_board()).await.unwrap();

    let statuses: Vec<ReceiptStatus> = board.receipts().await.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![ReceiptStatus::Ok, ReceiptStatus::Error, ReceiptStatus::Ok]
    );
    assert!(board.contact_for(&GadgetId::new("ghost"), "a").await.is_none());
    assert_eq!(board.contact_ids().await.len(), 3);

    set(&executor, &board, "add", "a", json!(5)).await;
    set(&executor, &board, "add", "b", json!(3)).await;
    assert_eq!(board.pin_value(&GadgetId::new("add"), "sum").await.unwrap(), json!(8));
}

#[tokio::test]
async fn lone_rate_limit_with_bad_params_is_not_dropped() {
    let executor = executor();
    let err = executor
        .initialize_board(relay_board(vec![AspectInstance::with_params(
            "rate-limit",
            json!({"rps": "fast"}),
        )]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Gadget(GadgetError::InvalidParams { ref template, .. }) if template == "rate-limit"
    ));
    assert!(executor.board(&BoardId::new("relay")).await.is_none());
}

#[tokio::test]
async fn clashing_registration_is_rejected_before_install() {
    let executor = executor();
    let board = executor
        .initialize_board(relay_board(vec![AspectInstance::new("tap")]))
        .await
        .unwrap();
    let graph = board.graph().await;
    let shim = graph.shims_on(&WireId::new("w"))[0].id.clone();
    let contacts = board.contact_ids().await;

    // A gadget named after the shim would take the shim's registration.
    let err = executor
        .mount_gadget(board.id(), "dst", shim.as_str(), "passthrough")
        .await
        .unwrap_err();
    match err {
        RuntimeError::Rejected(reason) => assert!(reason.contains("already registered")),
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert_eq!(board.contact_ids().await, contacts);
    assert_eq!(board.graph().await, graph);
    let receipts = board.receipts().await;
    assert_eq!(receipts.last().map(|r| r.status), Some(ReceiptStatus::Error));

    set(&executor, &board, "src", "in", json!(7)).await;
    assert_eq!(board.pin_value(&GadgetId::new("sink"), "out").await.unwrap(), json!(7));
}

// ============================================================================
// Board lifecycle
// ============================================================================

#[tokio::test]
async fn boards_are_independent_and_cleaned_up() {
    let executor = executor();
    executor.initialize_board(adder_board()).await.unwrap();
    executor.initialize_board(relay_board(vec![])).await.unwrap();
    assert_eq!(
        executor.boards().await,
        vec![BoardId::new("b"), BoardId::new("relay")]
    );

    let err = executor.initialize_board(adder_board()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::BoardExists(_)));

    let relay = executor.board(&BoardId::new("relay")).await.unwrap();
    executor.cleanup(&BoardId::new("relay")).await.unwrap();
    assert!(relay.contact_ids().await.is_empty());
    assert!(executor.board(&BoardId::new("relay")).await.is_none());

    let err = executor.cleanup(&BoardId::new("relay")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::BoardNotFound(_)));
    let err = executor
        .update_contact(&BoardId::new("relay"), &ContactId::new("x"), json!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::BoardNotFound(_)));
}

#[test]
fn config_deserializes_with_defaults() {
    let config: RuntimeConfig = serde_json::from_value(json!({"max_rounds": 8})).unwrap();
    assert_eq!(config.max_rounds, 8);
    assert_eq!(config.default_lattice, "max");
    assert_eq!(config.limits.max_depth, 100);
}
