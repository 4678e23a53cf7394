//! One transaction per store call: commit on success, explicit rollback on error.

use rusqlite::{Connection, TransactionBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Deferred; takes no lock until the first read.
    Read,
    /// Immediate; takes the write lock up front.
    Write,
}

impl TxMode {
    fn behavior(self) -> TransactionBehavior {
        match self {
            TxMode::Read => TransactionBehavior::Deferred,
            TxMode::Write => TransactionBehavior::Immediate,
        }
    }
}

/// Run `f` inside one transaction; commit on `Ok`, roll back on `Err`.
///
/// A failed rollback is logged and the error from `f` is returned.
pub fn in_transaction<T, E, F>(conn: &mut Connection, mode: TxMode, f: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<rusqlite::Error>,
{
    let tx = conn.transaction_with_behavior(mode.behavior())?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                log::warn!("Rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}
