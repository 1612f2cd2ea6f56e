// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use super::budgets::{allocations_for, attribute, attributed_expense};
use super::store::{splits_by_transaction, transactions_between};
use super::taxonomy::{Taxonomy, UNCATEGORIZED};
use super::with_snapshot;
use crate::errors::{LedgerError, Result};
use crate::models::{BudgetAllocation, Transaction, TransactionSplit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Period {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if to < from {
            return Err(LedgerError::validation(format!(
                "period ends ({}) before it starts ({})",
                to, from
            )));
        }
        Ok(Period { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurposeVariance {
    pub purpose_id: i64,
    pub purpose_path: String,
    pub budgeted: Decimal,
    pub actual: Decimal,
    pub variance: Decimal,
    pub variance_percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurposeSpend {
    pub purpose_path: String,
    pub expense: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialReport {
    pub period: Period,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_income: Decimal,
    pub transaction_count: usize,
    pub variances: Vec<PurposeVariance>,
    pub spend_by_purpose: Vec<PurposeSpend>,
}

/// `actual - budgeted` as a percentage of `budgeted`; 0 when nothing was
/// budgeted.
pub fn variance_percentage(budgeted: Decimal, actual: Decimal) -> Decimal {
    if budgeted.is_zero() {
        return Decimal::ZERO;
    }
    ((actual - budgeted) / budgeted * Decimal::ONE_HUNDRED).round_dp(2)
}

pub fn assemble(
    period: Period,
    transactions: &[Transaction],
    splits: &HashMap<i64, Vec<TransactionSplit>>,
    budgeted: &[BudgetAllocation],
    taxonomy: &Taxonomy,
) -> FinancialReport {
    let in_period: Vec<Transaction> = transactions
        .iter()
        .filter(|t| period.contains(t.date))
        .cloned()
        .collect();
    let total_income: Decimal = in_period.iter().map(|t| t.income).sum();
    let total_expense: Decimal = in_period.iter().map(|t| t.expense).sum();
    let attributions = attribute(&in_period, splits);

    let variances = budgeted
        .iter()
        .map(|a| {
            let actual = attributed_expense(&attributions, taxonomy, a.purpose_id);
            PurposeVariance {
                purpose_id: a.purpose_id,
                purpose_path: taxonomy.display_path(Some(a.purpose_id)),
                budgeted: a.allocated_amount,
                actual,
                variance: actual - a.allocated_amount,
                variance_percentage: variance_percentage(a.allocated_amount, actual),
            }
        })
        .collect();

    let mut by_path: BTreeMap<String, Decimal> = BTreeMap::new();
    for a in attributions.iter().filter(|a| !a.expense.is_zero()) {
        *by_path
            .entry(taxonomy.display_path(a.purpose_id))
            .or_insert(Decimal::ZERO) += a.expense;
    }
    let mut spend_by_purpose: Vec<PurposeSpend> = by_path
        .into_iter()
        .map(|(purpose_path, expense)| PurposeSpend {
            purpose_path,
            expense,
        })
        .collect();
    spend_by_purpose.sort_by(|a, b| {
        (a.purpose_path == UNCATEGORIZED)
            .cmp(&(b.purpose_path == UNCATEGORIZED))
            .then(b.expense.cmp(&a.expense))
    });

    FinancialReport {
        period,
        total_income,
        total_expense,
        net_income: total_income - total_expense,
        transaction_count: in_period.len(),
        variances,
        spend_by_purpose,
    }
}

/// Loads the period's transactions, and the allocations of `budget_id` when
/// given, from one snapshot and assembles the report.
pub fn financial_report(
    conn: &Connection,
    period: Period,
    budget_id: Option<i64>,
) -> Result<FinancialReport> {
    with_snapshot(conn, |db| {
        let txs = transactions_between(db, period.from, period.to)?;
        let ids: Vec<i64> = txs.iter().map(|t| t.id).collect();
        let splits = splits_by_transaction(db, &ids)?;
        let allocations = match budget_id {
            Some(id) => {
                super::budgets::get_budget(db, id)?;
                allocations_for(db, id)?
            }
            None => Vec::new(),
        };
        let taxonomy = Taxonomy::load(db)?;
        Ok(assemble(period, &txs, &splits, &allocations, &taxonomy))
    })
}
