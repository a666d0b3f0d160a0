//! Storage scopes: units of atomic work across the ledger and the DAO.
//!
//! Stores do their writes eagerly and register a compensating action in
//! the scope they were handed. Committing forgets the journal; rolling
//! back replays it newest-first, so every write is reverted in the exact
//! reverse order it was made.
//!
//! ```text
//! atomically(|scope| {
//!     ledger.merge(addr, &debit, scope)?;     // journal: [restore addr]
//!     store.insert("tr", row, scope)?;         // journal: [.., delete row]
//!     plugin.apply(.., scope)                  // Err -> journal replayed
//! })
//! ```

use std::fmt;

type Compensation = Box<dyn FnOnce() + Send>;

/// A journal of compensations for writes made inside one unit of work.
#[derive(Default)]
pub struct Scope {
    journal: Vec<Compensation>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("pending", &self.journal.len())
            .finish()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the action that undoes a write just made.
    pub fn on_rollback(&mut self, undo: impl FnOnce() + Send + 'static) {
        self.journal.push(Box::new(undo));
    }

    /// Number of writes recorded so far.
    pub fn len(&self) -> usize {
        self.journal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    /// Keep every write made in this scope.
    pub fn commit(mut self) {
        self.journal.clear();
    }

    /// Revert every write made in this scope, newest first.
    pub fn rollback(mut self) {
        let count = self.journal.len();
        while let Some(undo) = self.journal.pop() {
            undo();
        }
        if count > 0 {
            tracing::debug!(writes = count, "storage scope rolled back");
        }
    }
}

/// Run `f` inside a fresh scope, committing on `Ok` and rolling back on
/// `Err`.
pub fn atomically<T, E>(f: impl FnOnce(&mut Scope) -> Result<T, E>) -> Result<T, E> {
    let mut scope = Scope::new();
    match f(&mut scope) {
        Ok(value) => {
            scope.commit();
            Ok(value)
        }
        Err(err) => {
            scope.rollback();
            Err(err)
        }
    }
}
