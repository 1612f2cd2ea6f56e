// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

use serde::Serialize;

use crate::errors::{LedgerError, Result};

/// Mutating operations the permission service can allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ManageAccounts,
    ManagePurposes,
    EditTransactions,
    SplitTransactions,
    ManageBudgets,
    ManageProjects,
    RequestVerification,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::ManageAccounts => "manage_accounts",
            Operation::ManagePurposes => "manage_purposes",
            Operation::EditTransactions => "edit_transactions",
            Operation::SplitTransactions => "split_transactions",
            Operation::ManageBudgets => "manage_budgets",
            Operation::ManageProjects => "manage_projects",
            Operation::RequestVerification => "request_verification",
        };
        f.write_str(s)
    }
}

/// Yes/no capability check supplied by whoever evaluates roles.
pub trait Capabilities {
    fn allows(&self, op: Operation) -> bool;
}

pub struct AllowAll;

impl Capabilities for AllowAll {
    fn allows(&self, _op: Operation) -> bool {
        true
    }
}

pub struct ReadOnly;

impl Capabilities for ReadOnly {
    fn allows(&self, _op: Operation) -> bool {
        false
    }
}

/// Explicit allow-list, handy when a caller only grants a few operations.
#[derive(Debug, Default, Clone)]
pub struct Granted(pub Vec<Operation>);

impl Capabilities for Granted {
    fn allows(&self, op: Operation) -> bool {
        self.0.contains(&op)
    }
}

pub fn ensure(caps: &dyn Capabilities, op: Operation) -> Result<()> {
    if caps.allows(op) {
        Ok(())
    } else {
        Err(LedgerError::PermissionDenied(op))
    }
}
