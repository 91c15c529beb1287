use crate::board::{BoardContext, Environment};
use crate::config::{PlanOutcome, RuntimeConfig, UpdateReport};
use bassline_aspects::AspectRegistry;
use bassline_binder::{BinderOptions, Plan, Rewriter};
use bassline_core::error::{GadgetError, RuntimeError};
use bassline_core::id::{BoardId, ContactId, GadgetId};
use bassline_core::ir::{BoardIr, Occupant};
use bassline_core::lattice::LatticeRegistry;
use bassline_gadgets::GadgetLibrary;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Drives any number of independent boards.
///
/// Each board gets its own binder, contact store, propagation engine and
/// gadget executor. Every mutation entry point runs the board to a fixed
/// point (or to `max_rounds`) before returning.
pub struct GraphExecutor {
    library: GadgetLibrary,
    aspects: Arc<AspectRegistry>,
    lattices: LatticeRegistry,
    rewriters: Vec<Rewriter>,
    config: RuntimeConfig,
    boards: RwLock<HashMap<BoardId, Arc<BoardContext>>>,
}

impl GraphExecutor {
    /// Create an executor. Pin lattices resolve against the built-in
    /// lattices unless [`with_lattices`](Self::with_lattices) says
    /// otherwise.
    pub fn new(library: GadgetLibrary, aspects: Arc<AspectRegistry>, config: RuntimeConfig) -> Self {
        Self {
            library,
            aspects,
            lattices: LatticeRegistry::with_builtins(),
            rewriters: Vec::new(),
            config,
            boards: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the lattice registry.
    pub fn with_lattices(mut self, lattices: LatticeRegistry) -> Self {
        self.lattices = lattices;
        self
    }

    /// Add a rewriter run on every board after initialization.
    pub fn with_rewriter(mut self, rewriter: Rewriter) -> Self {
        self.rewriters.push(rewriter);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The gadget library.
    pub fn library(&self) -> &GadgetLibrary {
        &self.library
    }

    fn env(&self) -> Environment<'_> {
        Environment {
            library: &self.library,
            lattices: &self.lattices,
            default_lattice: &self.config.default_lattice,
        }
    }

    async fn require(&self, board: &BoardId) -> Result<Arc<BoardContext>, RuntimeError> {
        self.board(board)
            .await
            .ok_or_else(|| RuntimeError::BoardNotFound(board.to_string()))
    }

    /// Compile and install a board, then run it to a fixed point.
    ///
    /// Every template and lattice the board needs is resolved before
    /// anything is installed, so a failure leaves no trace.
    pub async fn initialize_board(&self, ir: BoardIr) -> Result<Arc<BoardContext>, RuntimeError> {
        let id = ir.id.clone();
        if self.boards.read().await.contains_key(&id) {
            return Err(RuntimeError::BoardExists(id.to_string()));
        }
        let options = BinderOptions {
            principal: self.config.principal.clone(),
            rewriters: self.rewriters.clone(),
        };
        let (board, report) = BoardContext::initialize(
            ir,
            self.aspects.clone(),
            options,
            self.config.limits,
            self.config.max_rounds,
            &self.env(),
        )
        .await?;
        tracing::debug!(board = %id, rounds = report.rounds, quiescent = report.quiescent, "bassline.runtime.settled");

        let board = Arc::new(board);
        let mut boards = self.boards.write().await;
        if boards.contains_key(&id) {
            return Err(RuntimeError::BoardExists(id.to_string()));
        }
        boards.insert(id, board.clone());
        Ok(board)
    }

    /// Join `value` into a contact and run the board to a fixed point.
    pub async fn update_contact(
        &self,
        board: &BoardId,
        contact: &ContactId,
        value: Value,
    ) -> Result<UpdateReport, RuntimeError> {
        self.require(board).await?.update_contact(contact, value).await
    }

    /// Run one gadget if its activation accepts its current inputs, then
    /// run the board to a fixed point. The gadget's own execution comes
    /// first in the report.
    pub async fn execute_gadget(
        &self,
        board: &BoardId,
        gadget: &GadgetId,
    ) -> Result<UpdateReport, RuntimeError> {
        self.require(board).await?.execute_gadget(gadget).await
    }

    /// Mount a gadget instantiated from `template` into `slot`.
    ///
    /// An unknown template is a lookup error raised before the binder is
    /// consulted. A plan the binder rejects is returned as
    /// [`RuntimeError::Rejected`]; its receipt is still recorded.
    pub async fn mount_gadget(
        &self,
        board: &BoardId,
        slot: &str,
        gadget: impl Into<GadgetId>,
        template: &str,
    ) -> Result<PlanOutcome, RuntimeError> {
        let ctx = self.require(board).await?;
        if !self.library.contains(template) {
            return Err(GadgetError::UnknownTemplate(template.to_owned()).into());
        }
        let plan = Plan::mount(slot, Occupant::new(gadget, template));
        Self::accepted(ctx.apply_plan(plan, &self.env()).await?)
    }

    /// Unmount a gadget. Its node, its contacts, and wires naming it
    /// directly go away; receipts stay.
    pub async fn unmount_gadget(
        &self,
        board: &BoardId,
        gadget: &GadgetId,
    ) -> Result<PlanOutcome, RuntimeError> {
        let ctx = self.require(board).await?;
        if !ctx.has_gadget(gadget).await {
            return Err(RuntimeError::GadgetNotFound(gadget.to_string()));
        }
        let plan = Plan::unmount(gadget.clone());
        Self::accepted(ctx.apply_plan(plan, &self.env()).await?)
    }

    fn accepted(outcome: PlanOutcome) -> Result<PlanOutcome, RuntimeError> {
        if outcome.receipt.is_ok() {
            Ok(outcome)
        } else {
            Err(RuntimeError::Rejected(outcome.receipt.prov.reason))
        }
    }

    /// Apply an arbitrary plan. A rejected plan is not an error here: it
    /// comes back as an error receipt.
    pub async fn apply_plan(&self, board: &BoardId, plan: Plan) -> Result<PlanOutcome, RuntimeError> {
        self.require(board).await?.apply_plan(plan, &self.env()).await
    }

    /// Tear a board down and forget it.
    pub async fn cleanup(&self, board: &BoardId) -> Result<(), RuntimeError> {
        let ctx = self
            .boards
            .write()
            .await
            .remove(board)
            .ok_or_else(|| RuntimeError::BoardNotFound(board.to_string()))?;
        ctx.shutdown().await
    }

    /// A board, if initialized.
    pub async fn board(&self, board: &BoardId) -> Option<Arc<BoardContext>> {
        self.boards.read().await.get(board).cloned()
    }

    /// Ids of every initialized board, sorted.
    pub async fn boards(&self) -> Vec<BoardId> {
        let mut ids: Vec<BoardId> = self.boards.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("library", &self.library)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
