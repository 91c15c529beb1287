use crate::lower::lower;
use crate::plan::{Plan, PlanOp};
use crate::rewrite::Rewriter;
use crate::validate::{normalize, validate};
use bassline_aspects::AspectRegistry;
use bassline_core::error::BinderError;
use bassline_core::graph::{GraphDiff, RealizedGraph};
use bassline_core::id::ReceiptId;
use bassline_core::ir::BoardIr;
use bassline_core::receipt::Receipt;
use std::sync::Arc;

/// Binder configuration.
#[derive(Debug, Clone)]
pub struct BinderOptions {
    /// Principal recorded on receipts when a plan names none.
    pub principal: String,
    /// Passes run once after initialization.
    pub rewriters: Vec<Rewriter>,
}

impl BinderOptions {
    /// Set the default principal.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = principal.into();
        self
    }

    /// Add a rewriter.
    pub fn with_rewriter(mut self, rewriter: Rewriter) -> Self {
        self.rewriters.push(rewriter);
        self
    }
}

impl Default for BinderOptions {
    fn default() -> Self {
        Self {
            principal: "binder".into(),
            rewriters: Vec::new(),
        }
    }
}

/// Owns one board's IR and realized graph, and the receipts recording how
/// they got there.
///
/// Every mutation is whole-graph: the candidate IR is normalized,
/// validated and lowered from scratch, and the new graph replaces the old
/// one only if all of that succeeds.
#[derive(Debug)]
pub struct Binder {
    registry: Arc<AspectRegistry>,
    options: BinderOptions,
    ir: Option<BoardIr>,
    graph: RealizedGraph,
    receipts: Vec<Receipt>,
}

impl Binder {
    /// Create a binder with no board yet.
    pub fn new(registry: Arc<AspectRegistry>, options: BinderOptions) -> Self {
        Self {
            registry,
            options,
            ir: None,
            graph: RealizedGraph::new(),
            receipts: Vec::new(),
        }
    }

    /// Take ownership of a board.
    ///
    /// Returns the graph as it stands after rewriters have run, and the
    /// initialization receipt. On error the binder stays uninitialized.
    pub fn initialize(&mut self, ir: BoardIr) -> Result<(RealizedGraph, Receipt), BinderError> {
        self.initialize_checked(ir, |_, _| Ok(()))
    }

    /// Like [`initialize`](Self::initialize), but every rewriter plan goes
    /// through [`apply_plan_checked`](Self::apply_plan_checked) with
    /// `check`. A vetoed rewriter plan gets an error receipt and the board
    /// carries on without it.
    pub fn initialize_checked<F>(
        &mut self,
        ir: BoardIr,
        check: F,
    ) -> Result<(RealizedGraph, Receipt), BinderError>
    where
        F: Fn(&RealizedGraph, &[GraphDiff]) -> Result<(), String>,
    {
        if let Some(existing) = &self.ir {
            return Err(BinderError::AlreadyInitialized(existing.id.to_string()));
        }
        let mut ir = ir;
        normalize(&mut ir);
        validate(&ir)?;
        let graph = lower(&ir, &self.registry)?;
        let diffs = RealizedGraph::diff(&RealizedGraph::new(), &graph);
        tracing::info!(
            board = %ir.id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            deferred = graph.deferred.len(),
            "bassline.binder.initialized"
        );

        self.ir = Some(ir);
        self.graph = graph;
        let receipt = Receipt::ok(self.next_receipt_id(), diffs, &self.options.principal, "initialize");
        self.receipts.push(receipt.clone());

        self.run_rewriters(&check);
        Ok((self.graph.clone(), receipt))
    }

    fn run_rewriters<F>(&mut self, check: &F)
    where
        F: Fn(&RealizedGraph, &[GraphDiff]) -> Result<(), String>,
    {
        let mut rewriters = self.options.rewriters.clone();
        rewriters.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        for rewriter in rewriters {
            let Some(ir) = &self.ir else {
                return;
            };
            match rewriter.run(ir) {
                Ok(plans) => {
                    tracing::debug!(rewriter = %rewriter.name, plans = plans.len(), "bassline.binder.rewriter_ran");
                    for mut plan in plans {
                        if plan.by.is_empty() {
                            plan.by = format!("rewriter:{}", rewriter.name);
                        }
                        self.apply_plan_checked(plan, check);
                    }
                }
                Err(e) => {
                    tracing::warn!(rewriter = %rewriter.name, error = %e, "bassline.binder.rewriter_failed");
                }
            }
        }
    }

    /// Apply a plan. Always yields exactly one receipt; a rejected plan
    /// leaves the IR and graph untouched and its receipt carries the
    /// reason.
    pub fn apply_plan(&mut self, plan: Plan) -> Receipt {
        self.apply_plan_checked(plan, |_, _| Ok(()))
    }

    /// Like [`apply_plan`](Self::apply_plan), but `check` sees the
    /// candidate graph and its diff before anything is committed and may
    /// veto it. A veto is recorded as an error receipt with the returned
    /// reason.
    pub fn apply_plan_checked<F>(&mut self, plan: Plan, check: F) -> Receipt
    where
        F: FnOnce(&RealizedGraph, &[GraphDiff]) -> Result<(), String>,
    {
        let by = if plan.by.is_empty() {
            self.options.principal.clone()
        } else {
            plan.by.clone()
        };
        let reason = if plan.reason.is_empty() {
            plan.op.to_string()
        } else {
            plan.reason.clone()
        };

        let candidate = self.try_apply(plan.op).map_err(|e| e.to_string()).and_then(|(ir, graph)| {
            let diffs = RealizedGraph::diff(&self.graph, &graph);
            check(&graph, &diffs)?;
            Ok((ir, graph, diffs))
        });
        let receipt = match candidate {
            Ok((ir, graph, diffs)) => {
                tracing::debug!(board = %ir.id, diffs = diffs.len(), reason = %reason, "bassline.binder.plan_applied");
                self.ir = Some(ir);
                self.graph = graph;
                Receipt::ok(self.next_receipt_id(), diffs, &by, reason)
            }
            Err(e) => {
                tracing::warn!(reason = %reason, error = %e, "bassline.binder.plan_rejected");
                Receipt::error(self.next_receipt_id(), &by, e)
            }
        };
        self.receipts.push(receipt.clone());
        receipt
    }

    fn try_apply(&self, op: PlanOp) -> Result<(BoardIr, RealizedGraph), BinderError> {
        let mut ir = self.ir.clone().ok_or(BinderError::NotInitialized)?;
        match op {
            PlanOp::AddWire { wire } => ir.wires.push(wire),
            PlanOp::UpdateWire { id, patch } => {
                let wire = ir
                    .wires
                    .iter_mut()
                    .find(|w| w.id == id)
                    .ok_or_else(|| BinderError::NotFound(format!("wire {id}")))?;
                patch.apply(wire);
            }
            PlanOp::WeaveWires { selector, aspect } => {
                let mut matched = 0;
                for wire in ir.wires.iter_mut().filter(|w| selector.matches(w)) {
                    wire.aspects.push(aspect.clone());
                    matched += 1;
                }
                if matched == 0 {
                    return Err(BinderError::NotFound(format!(
                        "no wire matches selector {selector:?}"
                    )));
                }
            }
            PlanOp::RemoveWire { id } => {
                let before = ir.wires.len();
                ir.wires.retain(|w| w.id != id);
                if ir.wires.len() == before {
                    return Err(BinderError::NotFound(format!("wire {id}")));
                }
            }
            PlanOp::MountGadget { slot, occupant } => {
                if !ir.slots.contains_key(&slot) {
                    return Err(BinderError::NotFound(format!("slot {slot}")));
                }
                ir.occupants.entry(slot).or_default().push(occupant);
            }
            PlanOp::UnmountGadget { gadget } => {
                let Some((slot, index)) = ir.slot_of(&gadget).map(|(s, i)| (s.to_owned(), i)) else {
                    return Err(BinderError::NotFound(format!("gadget {gadget}")));
                };
                if let Some(occupants) = ir.occupants.get_mut(&slot) {
                    occupants.remove(index);
                }
                ir.wires.retain(|w| {
                    w.from.gadget.as_ref() != Some(&gadget) && w.to.gadget.as_ref() != Some(&gadget)
                });
            }
        }
        normalize(&mut ir);
        validate(&ir)?;
        let graph = lower(&ir, &self.registry)?;
        Ok((ir, graph))
    }

    fn next_receipt_id(&self) -> ReceiptId {
        let board = self.ir.as_ref().map(|ir| ir.id.as_str()).unwrap_or_default();
        ReceiptId::new(format!("{board}#{}", self.receipts.len() + 1))
    }

    /// Current IR, once initialized.
    pub fn ir(&self) -> Option<&BoardIr> {
        self.ir.as_ref()
    }

    /// Current realized graph. Empty before initialization.
    pub fn graph(&self) -> &RealizedGraph {
        &self.graph
    }

    /// Every receipt issued, oldest first.
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// The aspect registry this binder lowers against.
    pub fn registry(&self) -> &AspectRegistry {
        &self.registry
    }
}
