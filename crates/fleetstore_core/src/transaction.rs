//! Transaction boundary for units of work.
//!
//! # Invariants
//! - Exactly one of commit or rollback happens per opened transaction.
//! - The operation's error is returned unchanged; a rollback failure is logged,
//!   never substituted for it.
//! - A panic inside the operation drops the transaction, which rolls it back.

use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Instant;

/// Opens, commits and rolls back transactions on one connection.
#[derive(Debug, Clone, Copy)]
pub struct TransactionManager<'conn> {
    conn: &'conn Connection,
}

impl<'conn> TransactionManager<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Opens an `IMMEDIATE` transaction. Dropping it without commit rolls back.
    pub fn begin(&self) -> rusqlite::Result<Transaction<'conn>> {
        Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
    }

    /// Runs `op` inside a fresh transaction.
    ///
    /// Commits when `op` returns `Ok`; rolls back and returns the original
    /// error when it returns `Err`.
    pub fn run_in_transaction<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'conn>) -> Result<T, E>,
        E: From<rusqlite::Error> + std::fmt::Display,
    {
        let started_at = Instant::now();
        let tx = match self.begin() {
            Ok(tx) => tx,
            Err(err) => {
                error!(
                    "event=tx_begin module=transaction status=error error={}",
                    err
                );
                return Err(err.into());
            }
        };

        match op(&tx) {
            Ok(value) => {
                if let Err(err) = tx.commit() {
                    error!(
                        "event=tx_commit module=transaction status=error duration_ms={} error={}",
                        started_at.elapsed().as_millis(),
                        err
                    );
                    return Err(err.into());
                }
                info!(
                    "event=tx_commit module=transaction status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(op_err) => {
                match tx.rollback() {
                    Ok(()) => info!(
                        "event=tx_rollback module=transaction status=ok duration_ms={} cause={}",
                        started_at.elapsed().as_millis(),
                        op_err
                    ),
                    Err(rollback_err) => error!(
                        "event=tx_rollback module=transaction status=error duration_ms={} cause={} error={}",
                        started_at.elapsed().as_millis(),
                        op_err,
                        rollback_err
                    ),
                }
                Err(op_err)
            }
        }
    }
}

/// Wraps `op` so that every call runs in its own transaction.
///
/// The returned function takes the manager and `op`'s remaining arguments; the
/// transaction argument is supplied by the wrapper.
pub fn wrap_in_transaction<'conn, A, T, E, F>(
    op: F,
) -> impl Fn(&TransactionManager<'conn>, A) -> Result<T, E>
where
    F: Fn(&Transaction<'conn>, A) -> Result<T, E>,
    E: From<rusqlite::Error> + std::fmt::Display,
{
    move |manager: &TransactionManager<'conn>, args: A| {
        manager.run_in_transaction(|tx| op(tx, args))
    }
}
