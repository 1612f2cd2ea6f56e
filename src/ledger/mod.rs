// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod balances;
pub mod budgets;
pub mod projects;
pub mod reports;
pub mod splits;
pub mod store;
pub mod taxonomy;

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::errors::Result;

/// Runs `f` inside a read transaction so every query it issues sees the same
/// snapshot. Joins an enclosing transaction when one is already open.
pub(crate) fn with_snapshot<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = conn.unchecked_transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

/// Runs `f` inside an IMMEDIATE transaction: the write lock is taken up
/// front and nothing `f` wrote survives an error.
pub(crate) fn with_write<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

/// Result of a batch of independent per-item writes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<i64>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub item: i64,
    pub reason: String,
}

impl BatchOutcome {
    pub fn record(&mut self, item: i64, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded.push(item),
            Err(err) => {
                tracing::warn!(item, error = %err, "batch item failed");
                self.failed.push(BatchFailure {
                    item,
                    reason: err.to_string(),
                });
            }
        }
    }
}
