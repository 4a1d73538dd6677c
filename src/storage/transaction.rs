//! Transaction coordinator
//!
//! Scopes nest; only the outermost scope touches the native SQLite
//! transaction. Every scope must be marked successful before it ends for the
//! outermost `end_transaction` to commit; a single unmarked scope rolls the
//! whole transaction back.
//!
//! Engine-internal operations (a save with links, a clear) run in an implicit
//! scope: a fresh transaction when none is open, otherwise a savepoint so a
//! failed operation is undone without poisoning the caller's transaction.

use super::Engine;
use crate::{Error, Result};

#[derive(Debug, Default)]
pub(crate) struct TxState {
    /// Success flag per open scope, innermost last
    scopes: Vec<bool>,
    /// An inner scope ended without being marked
    poisoned: bool,
    next_savepoint: u64,
}

impl TxState {
    pub(crate) fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Forget all scopes; returns true if any were open
    pub(crate) fn reset(&mut self) -> bool {
        let open = !self.scopes.is_empty();
        self.scopes.clear();
        self.poisoned = false;
        open
    }
}

impl Engine {
    /// Open a transaction scope
    pub fn begin_transaction(&self) -> Result<()> {
        let conn = self.conn()?;
        let mut tx = self.tx.borrow_mut();
        if tx.scopes.is_empty() {
            conn.execute_batch("BEGIN TRANSACTION")?;
            tx.poisoned = false;
            tracing::debug!("Began transaction");
        }
        tx.scopes.push(false);
        Ok(())
    }

    /// Mark the innermost scope as eligible to commit
    pub fn set_transaction_successful(&self) -> Result<()> {
        let mut tx = self.tx.borrow_mut();
        let innermost = tx.scopes.last_mut().ok_or(Error::UnbalancedTransaction)?;
        *innermost = true;
        Ok(())
    }

    /// Close the innermost scope, committing or rolling back at depth 0
    pub fn end_transaction(&self) -> Result<()> {
        let conn = self.conn()?;
        let mut tx = self.tx.borrow_mut();
        let successful = tx.scopes.pop().ok_or(Error::UnbalancedTransaction)?;
        if !successful {
            tx.poisoned = true;
        }
        if !tx.scopes.is_empty() {
            return Ok(());
        }

        let rollback = std::mem::take(&mut tx.poisoned);
        drop(tx);
        if rollback {
            conn.execute_batch("ROLLBACK")?;
            tracing::debug!("Rolled back transaction");
            self.restore_tables();
        } else if let Err(e) = conn.execute_batch("COMMIT") {
            // A failed COMMIT can leave the transaction open
            if !conn.is_autocommit() {
                let _ = conn.execute_batch("ROLLBACK");
                self.restore_tables();
            }
            return Err(e.into());
        } else {
            tracing::debug!("Committed transaction");
        }
        Ok(())
    }

    /// True while an explicit scope is open
    pub fn in_transaction(&self) -> bool {
        self.tx.borrow().depth() > 0
    }

    /// Number of open scopes
    pub fn transaction_depth(&self) -> usize {
        self.tx.borrow().depth()
    }

    /// Open a scope that ends when the returned guard is dropped.
    ///
    /// The scope only counts as successful if [`TransactionScope::commit`]
    /// is called.
    pub fn transaction(&self) -> Result<TransactionScope<'_>> {
        self.begin_transaction()?;
        Ok(TransactionScope {
            engine: self,
            ended: false,
        })
    }

    /// Run `f` atomically: in its own transaction, or in a savepoint of the
    /// caller's open transaction.
    pub(crate) fn with_scope<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        if !self.in_transaction() {
            self.begin_transaction()?;
            return match f() {
                Ok(value) => {
                    self.set_transaction_successful()?;
                    self.end_transaction()?;
                    Ok(value)
                }
                Err(e) => {
                    if let Err(end_err) = self.end_transaction() {
                        tracing::warn!("Rollback after failed operation failed: {}", end_err);
                    }
                    Err(e)
                }
            };
        }

        let name = {
            let mut tx = self.tx.borrow_mut();
            tx.next_savepoint += 1;
            format!("lazydb_sp_{}", tx.next_savepoint)
        };
        let conn = self.conn()?;
        conn.execute_batch(&format!("SAVEPOINT {}", name))?;
        let result = f().and_then(|value| {
            conn.execute_batch(&format!("RELEASE {}", name))?;
            Ok(value)
        });
        match result {
            Ok(value) => Ok(value),
            // Also reached when RELEASE fails, so the savepoint is never left open
            Err(e) => {
                let undo = format!("ROLLBACK TO {name}; RELEASE {name}");
                if let Err(undo_err) = conn.execute_batch(&undo) {
                    tracing::warn!("Rollback to savepoint {} failed: {}", name, undo_err);
                }
                self.restore_tables();
                Err(e)
            }
        }
    }
}

/// RAII transaction scope; rolls back unless committed or marked successful.
pub struct TransactionScope<'e> {
    engine: &'e Engine,
    ended: bool,
}

impl TransactionScope<'_> {
    /// Mark the scope successful without ending it; dropping the guard then commits
    pub fn mark_successful(&self) -> Result<()> {
        self.engine.set_transaction_successful()
    }

    /// Mark successful and end the scope
    pub fn commit(mut self) -> Result<()> {
        self.ended = true;
        self.engine.set_transaction_successful()?;
        self.engine.end_transaction()
    }

    /// End the scope without marking it
    pub fn rollback(mut self) -> Result<()> {
        self.ended = true;
        self.engine.end_transaction()
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(e) = self.engine.end_transaction() {
                tracing::warn!("Ending dropped transaction scope failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Engine, Error};

    #[test]
    fn test_depth_tracking() {
        let engine = Engine::open_in_memory().unwrap();
        assert!(!engine.in_transaction());
        engine.begin_transaction().unwrap();
        engine.begin_transaction().unwrap();
        assert_eq!(engine.transaction_depth(), 2);
        engine.set_transaction_successful().unwrap();
        engine.end_transaction().unwrap();
        engine.set_transaction_successful().unwrap();
        engine.end_transaction().unwrap();
        assert!(!engine.in_transaction());
    }

    #[test]
    fn test_unbalanced_end() {
        let engine = Engine::open_in_memory().unwrap();
        let err = engine.end_transaction().unwrap_err();
        assert!(matches!(err, Error::UnbalancedTransaction));
        assert!(err.is_programmer_error());
        assert!(engine.set_transaction_successful().is_err());
    }

    #[test]
    fn test_failed_release_is_reported() {
        let engine = Engine::open_in_memory().unwrap();
        engine.begin_transaction().unwrap();
        let err = engine
            .with_scope(|| {
                // Savepoint names count up from 1
                engine.conn()?.execute_batch("RELEASE lazydb_sp_1")?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(engine.transaction_depth(), 1);

        engine.with_scope(|| Ok(())).unwrap();
        engine.set_transaction_successful().unwrap();
        engine.end_transaction().unwrap();
        assert!(!engine.in_transaction());
    }

    #[test]
    fn test_guard_ends_scope_on_drop() {
        let engine = Engine::open_in_memory().unwrap();
        {
            let _scope = engine.transaction().unwrap();
            assert!(engine.in_transaction());
        }
        assert!(!engine.in_transaction());

        engine.transaction().unwrap().commit().unwrap();
        assert!(!engine.in_transaction());
    }
}
