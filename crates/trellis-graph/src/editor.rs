//! Editor - the front door for local edits.
//!
//! An [`Editor`] owns the store, the undo/redo history and the constraint
//! engine, and keeps an outbox of committed transactions waiting to be
//! replicated. The flow for a local edit is:
//!
//! 1. `begin_action(name)` opens an undoable step
//! 2. `transact(|txn| ..)` runs edits in a live transaction, re-settles
//!    constraints over the page and records the transaction
//! 3. `end_action()` pushes the step onto the undo stack and moves its
//!    transactions to the outbox
//!
//! A `transact` without an open action is its own one-transaction action.
//! Cancelled actions never reach the outbox.

use crate::config::EditorConfig;
use crate::constraint::{ConstraintEngine, ConstraintRegistry, Resolution};
use crate::error::Result;
use crate::history::{Action, ActionId, History};
use crate::store::Store;
use crate::transaction::{Transaction, Txn};
use tracing::{debug, warn};

/// Name given to actions opened implicitly by [`Editor::transact`].
pub const IMPLICIT_ACTION: &str = "edit";

/// Local editing session over one document.
pub struct Editor<C = ()> {
    store: Store,
    history: History,
    engine: ConstraintEngine<C>,
    config: EditorConfig,
    context: C,
    outbox: Vec<Transaction>,
}

impl Editor<()> {
    /// Create an editor without constraints or render context.
    pub fn with_store(store: Store) -> Self {
        Self::new(store, ConstraintRegistry::new(), (), EditorConfig::default())
    }
}

impl<C> Editor<C> {
    pub fn new(
        store: Store,
        registry: ConstraintRegistry<C>,
        context: C,
        config: EditorConfig,
    ) -> Self {
        let engine = ConstraintEngine::new(registry).with_max_iterations(config.max_iterations);
        Self {
            store,
            history: History::with_max_depth(config.max_undo_depth),
            engine,
            config,
            context,
            outbox: Vec::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn registry_mut(&mut self) -> &mut ConstraintRegistry<C> {
        self.engine.registry_mut()
    }

    // === Actions ===

    /// Open an undoable step.
    pub fn begin_action(&mut self, name: impl Into<String>) -> Result<ActionId> {
        self.history.begin_action(name)
    }

    /// Run `edit` in a live transaction.
    ///
    /// On success the transaction (plus whatever constraint resolution
    /// added) is recorded in the open action. On error everything the edit
    /// applied is rolled back and nothing is recorded.
    pub fn transact<T, F>(&mut self, edit: F) -> Result<T>
    where
        F: FnOnce(&mut Txn<'_>) -> Result<T>,
    {
        let implicit = !self.history.is_open();
        if implicit {
            self.history.begin_action(IMPLICIT_ACTION)?;
        }

        let page = self.store.root().cloned();
        let mut txn = Txn::new(&mut self.store);
        let value = match edit(&mut txn) {
            Ok(value) => value,
            Err(err) => {
                if let Err(rollback) = txn.rollback() {
                    warn!(error = %rollback, "rollback of failed edit was incomplete");
                }
                if implicit {
                    self.history.cancel_action(&mut self.store)?;
                }
                return Err(err);
            }
        };

        if self.config.resolve_constraints && !txn.is_empty() {
            if let Some(page) = &page {
                let Resolution { iterations, .. } =
                    self.engine.resolve_all(&mut txn, page, &self.context);
                debug!(iterations, "constraints resolved");
            }
        }

        let tx = txn.commit();
        self.history.record(tx)?;
        if implicit {
            self.end_action()?;
        }
        Ok(value)
    }

    /// Close the open action and queue its transactions for replication.
    pub fn end_action(&mut self) -> Result<()> {
        let transactions = self.history.end_action()?;
        self.outbox.extend(transactions);
        Ok(())
    }

    /// Abort the open action, reverting it. Nothing is replicated.
    pub fn cancel_action(&mut self) -> Result<()> {
        self.history.cancel_action(&mut self.store)
    }

    /// Merge the two most recent actions into one undo step when
    /// `pred(earlier, later)` holds.
    pub fn merge_last_actions<P>(&mut self, pred: P) -> bool
    where
        P: FnOnce(&Action, &Action) -> bool,
    {
        self.history.merge_last(pred)
    }

    /// Undo the last action. Returns `false` when there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        match self.history.undo(&mut self.store)? {
            Some(transactions) => {
                self.outbox.extend(transactions);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Redo the last undone action. Returns `false` when there was nothing
    /// to redo.
    pub fn redo(&mut self) -> Result<bool> {
        match self.history.redo(&mut self.store)? {
            Some(transactions) => {
                self.outbox.extend(transactions);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Forget all undo and redo steps. The open action, if any, is dropped
    /// without reverting it.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // === Replication hand-off ===

    /// Committed transactions not yet handed to replication, oldest first.
    pub fn take_outgoing(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Mutate the store directly, bypassing history and the outbox.
    ///
    /// This is the path for remote changes, which are never undoable.
    pub fn with_store_mut<T>(&mut self, f: impl FnOnce(&mut Store) -> T) -> T {
        f(&mut self.store)
    }
}
