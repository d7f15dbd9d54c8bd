//! Nested transaction bookkeeping.
//!
//! A single connection supports one real transaction at a time. Nesting is
//! emulated by reference counting: only the outermost `begin` opens the
//! transaction and only the matching outermost `commit`/`rollback` ends it.
//! A rollback at any inner level marks the whole transaction rollback-only,
//! so the outer commit is refused and the caller has to roll back.
//!
//! [`TransactionCounter`] is the pure state machine; [`Database`](crate::Database)
//! runs the statements it asks for.

use crate::error::{OrmError, Result};

/// Statement the caller must run after a counter transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Open the real transaction
    Begin,
    /// Commit the real transaction
    Commit,
    /// Roll the real transaction back
    Rollback,
    /// Nested level only; nothing to run
    Nested,
}

/// Reference-counted transaction state for one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionCounter {
    depth: u32,
    rollback_only: bool,
}

impl TransactionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Whether an inner rollback has poisoned the open transaction
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn begin(&mut self) -> Boundary {
        self.depth += 1;
        if self.depth == 1 {
            self.rollback_only = false;
            Boundary::Begin
        } else {
            Boundary::Nested
        }
    }

    /// # Errors
    ///
    /// `NoActiveTransaction` at depth 0; `RollbackOnly` when the outermost
    /// commit follows an inner rollback (the depth is left unchanged).
    pub fn commit(&mut self) -> Result<Boundary> {
        match self.depth {
            0 => Err(OrmError::NoActiveTransaction),
            1 if self.rollback_only => Err(OrmError::RollbackOnly),
            1 => {
                self.depth = 0;
                Ok(Boundary::Commit)
            }
            _ => {
                self.depth -= 1;
                Ok(Boundary::Nested)
            }
        }
    }

    /// # Errors
    ///
    /// `NoActiveTransaction` at depth 0.
    pub fn rollback(&mut self) -> Result<Boundary> {
        match self.depth {
            0 => Err(OrmError::NoActiveTransaction),
            1 => {
                self.depth = 0;
                self.rollback_only = false;
                Ok(Boundary::Rollback)
            }
            _ => {
                self.depth -= 1;
                self.rollback_only = true;
                Ok(Boundary::Nested)
            }
        }
    }

    /// Undo a `begin` whose BEGIN statement failed
    pub(crate) fn abort_begin(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Put back a state saved before a COMMIT/ROLLBACK statement failed
    pub(crate) fn restore(&mut self, saved: TransactionCounter) {
        *self = saved;
    }
}
