//! Undo/Redo History - named actions over transactions.
//!
//! Provides local undo/redo:
//! - Actions group one or more transactions into one undoable step
//! - Undo inverts an action's transactions in reverse order
//! - New actions invalidate the redo stack
//! - The two most recent actions can be merged into one step
//! - Optional maximum depth (oldest actions are dropped)
//!
//! Only locally-originated transactions are ever recorded here; remote edits
//! are applied to the store directly and are not undoable.

use crate::error::{GraphError, Result};
use crate::store::Store;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;
use ulid::Ulid;

/// Unique identifier for an action.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(String);

impl ActionId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named, user-undoable step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub name: String,
    pub transactions: Vec<Transaction>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActionId::new(),
            name: name.into(),
            transactions: Vec::new(),
        }
    }

    /// True when no recorded transaction changed anything.
    pub fn is_empty(&self) -> bool {
        self.transactions.iter().all(Transaction::is_empty)
    }

    /// Apply the transactions forward, in order, returning what actually
    /// changed. On failure the ones already applied are reverted.
    fn apply(&self, store: &mut Store) -> Result<Vec<Transaction>> {
        let mut applied = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            match tx.apply_effective(store) {
                Ok(effective) => applied.push(effective),
                Err(err) => {
                    revert_all(store, applied.iter().rev());
                    return Err(err);
                }
            }
        }
        Ok(applied)
    }

    /// Revert the transactions, last first, returning the inverses that
    /// actually changed something. On failure the ones already reverted are
    /// re-applied.
    fn revert(&self, store: &mut Store) -> Result<Vec<Transaction>> {
        let mut inverses = Vec::with_capacity(self.transactions.len());
        for tx in self.transactions.iter().rev() {
            match tx.invert().apply_effective(store) {
                Ok(effective) => inverses.push(effective),
                Err(err) => {
                    revert_all(store, inverses.iter().rev());
                    return Err(err);
                }
            }
        }
        Ok(inverses)
    }
}

fn revert_all<'a>(store: &mut Store, transactions: impl Iterator<Item = &'a Transaction>) {
    for tx in transactions {
        if let Err(err) = tx.revert(store) {
            tracing::warn!(error = %err, "could not restore state after a failed history step");
        }
    }
}

/// Undo and redo stacks plus the action currently being built.
#[derive(Clone, Debug, Default)]
pub struct History {
    /// Completed actions, most recent at the back.
    undo_stack: VecDeque<Action>,
    /// Undone actions, most recent at the back.
    redo_stack: VecDeque<Action>,
    /// Action being built between `begin_action` and `end_action`.
    open: Option<Action>,
    /// Maximum number of undoable actions (`None` for unbounded).
    max_depth: Option<usize>,
}

impl History {
    /// Create an unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history that keeps at most `max_depth` undoable actions.
    pub fn with_max_depth(max_depth: Option<usize>) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    /// Change the maximum depth, dropping old actions if needed.
    pub fn set_max_depth(&mut self, max_depth: Option<usize>) {
        self.max_depth = max_depth;
        self.trim();
    }

    // === Building actions ===

    /// Open a new action.
    pub fn begin_action(&mut self, name: impl Into<String>) -> Result<ActionId> {
        if let Some(open) = &self.open {
            return Err(GraphError::ActionAlreadyOpen(open.name.clone()));
        }
        let action = Action::new(name);
        let id = action.id.clone();
        self.open = Some(action);
        Ok(id)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_action(&self) -> Option<&Action> {
        self.open.as_ref()
    }

    /// Add a committed transaction to the open action.
    pub fn record(&mut self, tx: Transaction) -> Result<()> {
        let open = self.open.as_mut().ok_or(GraphError::NoOpenAction)?;
        if !tx.is_empty() {
            open.transactions.push(tx);
        }
        Ok(())
    }

    /// Close the open action and push it onto the undo stack.
    ///
    /// Clears the redo stack. An action that changed nothing is discarded.
    /// Returns the action's transactions, in order.
    pub fn end_action(&mut self) -> Result<Vec<Transaction>> {
        let action = self.open.take().ok_or(GraphError::NoOpenAction)?;
        if action.is_empty() {
            debug!(action = %action.name, "discarding empty action");
            return Ok(Vec::new());
        }

        let transactions = action.transactions.clone();
        self.undo_stack.push_back(action);
        self.redo_stack.clear();
        self.trim();
        Ok(transactions)
    }

    /// Abort the open action, reverting what it applied. Nothing is recorded.
    pub fn cancel_action(&mut self, store: &mut Store) -> Result<()> {
        let action = self.open.take().ok_or(GraphError::NoOpenAction)?;
        action.revert(store)?;
        Ok(())
    }

    // === Undo / redo ===

    /// Undo the most recent action.
    ///
    /// Returns the inverse transactions as they took effect, or `None` when
    /// there is nothing to undo. If applying fails, the store and stacks are
    /// left as they were.
    pub fn undo(&mut self, store: &mut Store) -> Result<Option<Vec<Transaction>>> {
        self.ensure_closed()?;
        let Some(action) = self.undo_stack.pop_back() else {
            return Ok(None);
        };

        match action.revert(store) {
            Ok(inverses) => {
                self.redo_stack.push_back(action);
                Ok(Some(inverses))
            }
            Err(err) => {
                self.undo_stack.push_back(action);
                Err(err)
            }
        }
    }

    /// Redo the most recently undone action.
    pub fn redo(&mut self, store: &mut Store) -> Result<Option<Vec<Transaction>>> {
        self.ensure_closed()?;
        let Some(action) = self.redo_stack.pop_back() else {
            return Ok(None);
        };

        match action.apply(store) {
            Ok(transactions) => {
                self.undo_stack.push_back(action);
                self.trim();
                Ok(Some(transactions))
            }
            Err(err) => {
                self.redo_stack.push_back(action);
                Err(err)
            }
        }
    }

    /// Fold the most recent action into the one before it when
    /// `pred(earlier, later)` holds. The merged step keeps the earlier
    /// action's id and name. Returns whether a merge happened.
    pub fn merge_last<P>(&mut self, pred: P) -> bool
    where
        P: FnOnce(&Action, &Action) -> bool,
    {
        let len = self.undo_stack.len();
        if len < 2 {
            return false;
        }
        if !pred(&self.undo_stack[len - 2], &self.undo_stack[len - 1]) {
            return false;
        }

        let Some(later) = self.undo_stack.pop_back() else {
            return false;
        };
        if let Some(earlier) = self.undo_stack.back_mut() {
            earlier.transactions.extend(later.transactions);
        }
        true
    }

    // === Inspection ===

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// The action the next `undo` would revert.
    pub fn peek_undo(&self) -> Option<&Action> {
        self.undo_stack.back()
    }

    /// Forget all history. An open action is dropped without reverting.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open = None;
    }

    fn ensure_closed(&self) -> Result<()> {
        match &self.open {
            Some(open) => Err(GraphError::ActionAlreadyOpen(open.name.clone())),
            None => Ok(()),
        }
    }

    fn trim(&mut self) {
        if let Some(max) = self.max_depth {
            while self.undo_stack.len() > max {
                self.undo_stack.pop_front();
            }
        }
    }
}
