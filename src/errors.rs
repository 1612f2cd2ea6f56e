// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Typed failures returned by every core ledger operation.
//!
//! The CLI layer wraps these in `anyhow` and decides how to present them;
//! nothing in `ledger` prints or panics on a failed operation.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::permissions::Operation;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Split amounts total {actual} but the transaction total is {expected}")]
    AmountMismatch { expected: Decimal, actual: Decimal },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Concurrent update to {entity} {id}; reload and try again")]
    ConcurrencyConflict { entity: &'static str, id: i64 },

    #[error("Purpose hierarchy loops back on purpose {0}")]
    CycleDetected(i64),

    #[error("Operation '{0}' is not permitted")]
    PermissionDenied(Operation),

    #[error("External service failed: {0}")]
    ExternalService(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        LedgerError::NotFound { entity, id }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict { .. })
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        if let rusqlite::Error::FromSqlConversionFailure(..) = err {
            return LedgerError::Corrupt(err.to_string());
        }
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                LedgerError::ConcurrencyConflict {
                    entity: "database",
                    id: 0,
                }
            }
            Some(ErrorCode::ConstraintViolation) => LedgerError::Validation(err.to_string()),
            _ => LedgerError::ExternalService(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Corrupt(err.to_string())
    }
}

/// Runs `op`, and if it loses an optimistic-write race runs it exactly once
/// more so the second attempt starts from a fresh read.
pub fn retry_on_conflict<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(err) if err.is_conflict() => {
            tracing::warn!(error = %err, "write conflict, retrying once");
            op()
        }
        other => other,
    }
}
