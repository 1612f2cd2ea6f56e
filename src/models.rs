// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::get_decimal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: i64,
    pub account_name: String,
    pub account_type: String,
    pub initial_amount: Decimal,
    pub revision: i64,
}

impl BankAccount {
    pub(crate) const COLUMNS: &'static str =
        "id, account_name, account_type, initial_amount, revision";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(BankAccount {
            id: r.get(0)?,
            account_name: r.get(1)?,
            account_type: r.get(2)?,
            initial_amount: get_decimal(r, 3)?,
            revision: r.get(4)?,
        })
    }
}

/// Main / business / specific purpose ids as stored on a transaction or split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTriple {
    pub main: Option<i64>,
    pub business: Option<i64>,
    pub specific: Option<i64>,
}

impl CategoryTriple {
    /// The most specific purpose set, which is the one that classifies the record.
    pub fn deepest(&self) -> Option<i64> {
        self.specific.or(self.business).or(self.main)
    }

    pub fn is_empty(&self) -> bool {
        self.deepest().is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub bank_account_id: i64,
    pub date: NaiveDate,
    pub main_description: String,
    pub sub_description: Option<String>,
    pub income: Decimal,
    pub expense: Decimal,
    pub payer_payee: Option<String>,
    pub category: CategoryTriple,
    pub project_account: Option<String>,
    pub audit_year: i32,
    pub reference_no: Option<String>,
    pub version: i64,
}

impl Transaction {
    pub(crate) const COLUMNS: &'static str = "id, bank_account_id, date, main_description, sub_description, income, expense, payer_payee, main_purpose_id, business_purpose_id, specific_purpose_id, project_account, audit_year, reference_no, version";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: r.get(0)?,
            bank_account_id: r.get(1)?,
            date: r.get(2)?,
            main_description: r.get(3)?,
            sub_description: r.get(4)?,
            income: get_decimal(r, 5)?,
            expense: get_decimal(r, 6)?,
            payer_payee: r.get(7)?,
            category: CategoryTriple {
                main: r.get(8)?,
                business: r.get(9)?,
                specific: r.get(10)?,
            },
            project_account: r.get(11)?,
            audit_year: r.get(12)?,
            reference_no: r.get(13)?,
            version: r.get(14)?,
        })
    }

    /// Amount a split of this transaction has to add up to.
    pub fn total(&self) -> Decimal {
        self.income + self.expense
    }

    pub fn net(&self) -> Decimal {
        self.income - self.expense
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSplit {
    pub id: i64,
    pub transaction_id: i64,
    pub split_index: i64,
    pub amount: Decimal,
    pub category: CategoryTriple,
    pub description: Option<String>,
}

impl TransactionSplit {
    pub(crate) const COLUMNS: &'static str = "id, transaction_id, split_index, amount, main_purpose_id, business_purpose_id, specific_purpose_id, description";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(TransactionSplit {
            id: r.get(0)?,
            transaction_id: r.get(1)?,
            split_index: r.get(2)?,
            amount: get_decimal(r, 3)?,
            category: CategoryTriple {
                main: r.get(4)?,
                business: r.get(5)?,
                specific: r.get(6)?,
            },
            description: r.get(7)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurposeLevel {
    Main,
    Business,
    Specific,
}

impl PurposeLevel {
    pub fn as_i64(self) -> i64 {
        match self {
            PurposeLevel::Main => 0,
            PurposeLevel::Business => 1,
            PurposeLevel::Specific => 2,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(PurposeLevel::Main),
            1 => Some(PurposeLevel::Business),
            2 => Some(PurposeLevel::Specific),
            _ => None,
        }
    }

    /// Level a parent of this level must have.
    pub fn parent_level(self) -> Option<Self> {
        match self {
            PurposeLevel::Main => None,
            PurposeLevel::Business => Some(PurposeLevel::Main),
            PurposeLevel::Specific => Some(PurposeLevel::Business),
        }
    }
}

impl fmt::Display for PurposeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurposeLevel::Main => f.write_str("main"),
            PurposeLevel::Business => f.write_str("business"),
            PurposeLevel::Specific => f.write_str("specific"),
        }
    }
}

/// Where a new purpose sits in the tree. Each variant names the only parent
/// level it accepts, so a level/parent mismatch cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Main,
    Business { main_id: i64 },
    Specific { business_id: i64 },
}

impl Placement {
    pub fn level(&self) -> PurposeLevel {
        match self {
            Placement::Main => PurposeLevel::Main,
            Placement::Business { .. } => PurposeLevel::Business,
            Placement::Specific { .. } => PurposeLevel::Specific,
        }
    }

    pub fn parent_id(&self) -> Option<i64> {
        match *self {
            Placement::Main => None,
            Placement::Business { main_id } => Some(main_id),
            Placement::Specific { business_id } => Some(business_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurposeNode {
    pub id: i64,
    pub name: String,
    pub level: PurposeLevel,
    pub parent_id: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Draft,
    Active,
    Closed,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetStatus::Draft => "draft",
            BudgetStatus::Active => "active",
            BudgetStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(BudgetStatus::Draft),
            "active" => Some(BudgetStatus::Active),
            "closed" => Some(BudgetStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub project_name: String,
    pub budget_year: i32,
    pub total_budget: Decimal,
    pub allocated_amount: Decimal,
    pub spent_amount: Decimal,
    pub remaining_amount: Decimal,
    pub status: BudgetStatus,
    pub version: i64,
}

impl Budget {
    pub(crate) const COLUMNS: &'static str = "id, project_name, budget_year, total_budget, allocated_amount, spent_amount, remaining_amount, status, version";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = r.get(7)?;
        Ok(Budget {
            id: r.get(0)?,
            project_name: r.get(1)?,
            budget_year: r.get(2)?,
            total_budget: get_decimal(r, 3)?,
            allocated_amount: get_decimal(r, 4)?,
            spent_amount: get_decimal(r, 5)?,
            remaining_amount: get_decimal(r, 6)?,
            status: BudgetStatus::parse(&status).unwrap_or(BudgetStatus::Draft),
            version: r.get(8)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub id: i64,
    pub budget_id: i64,
    pub purpose_id: i64,
    pub allocated_amount: Decimal,
    pub spent_amount: Decimal,
    pub remaining_amount: Decimal,
}

impl BudgetAllocation {
    pub(crate) const COLUMNS: &'static str =
        "id, budget_id, purpose_id, allocated_amount, spent_amount, remaining_amount";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(BudgetAllocation {
            id: r.get(0)?,
            budget_id: r.get(1)?,
            purpose_id: r.get(2)?,
            allocated_amount: get_decimal(r, 3)?,
            spent_amount: get_decimal(r, 4)?,
            remaining_amount: get_decimal(r, 5)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(ProjectStatus::Active),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAccount {
    pub id: i64,
    pub name: String,
    pub budget: Decimal,
    pub status: ProjectStatus,
}

impl ProjectAccount {
    pub(crate) const COLUMNS: &'static str = "id, name, budget, status";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = r.get(3)?;
        Ok(ProjectAccount {
            id: r.get(0)?,
            name: r.get(1)?,
            budget: get_decimal(r, 2)?,
            status: ProjectStatus::parse(&status).unwrap_or(ProjectStatus::Active),
        })
    }
}
