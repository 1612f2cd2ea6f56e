// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Purpose budgets and their allocations.
//!
//! Spend is never written by hand. It is derived from the expense attributed
//! to each allocation's purpose subtree within the budget's fiscal year. The
//! stored figures are refreshed in the same write as any allocation change
//! and any transaction or split change in that year.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;

use super::store::{splits_by_transaction, transactions_in_year};
use super::taxonomy::Taxonomy;
use super::{with_snapshot, with_write};
use crate::errors::{LedgerError, Result, retry_on_conflict};
use crate::models::{Budget, BudgetAllocation, BudgetStatus, Transaction, TransactionSplit};
use crate::permissions::{Capabilities, Operation, ensure};
use crate::utils::money;

pub const WARNING_THRESHOLD: Decimal = Decimal::from_parts(80, 0, 0, false, 0);
pub const EXCEPTION_THRESHOLD: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UtilizationBand {
    Normal,
    Warning,
    Exception,
}

impl UtilizationBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            UtilizationBand::Normal => "normal",
            UtilizationBand::Warning => "warning",
            UtilizationBand::Exception => "exception",
        }
    }
}

/// Below 80 is normal, 80 up to and including 100 is a warning, anything
/// above 100 is an exception.
pub fn classify(percent: Decimal) -> UtilizationBand {
    if percent > EXCEPTION_THRESHOLD {
        UtilizationBand::Exception
    } else if percent >= WARNING_THRESHOLD {
        UtilizationBand::Warning
    } else {
        UtilizationBand::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Utilization {
    pub percent: Decimal,
    pub band: UtilizationBand,
}

impl Utilization {
    /// `spent` as a share of `base`. With nothing to spend against, any
    /// spend at all is an exception.
    pub fn of(spent: Decimal, base: Decimal) -> Self {
        if base.is_zero() {
            let band = if spent > Decimal::ZERO {
                UtilizationBand::Exception
            } else {
                UtilizationBand::Normal
            };
            return Utilization {
                percent: Decimal::ZERO,
                band,
            };
        }
        let exact = spent / base * Decimal::ONE_HUNDRED;
        Utilization {
            percent: exact.round_dp(2),
            band: classify(exact),
        }
    }
}

/// Income and expense of one transaction, or one split part, credited to the
/// purpose that classifies it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attribution {
    pub transaction_id: i64,
    pub purpose_id: Option<i64>,
    pub income: Decimal,
    pub expense: Decimal,
}

/// Unsplit transactions credit their deepest category. Split parts credit
/// their own purpose, with the part amount divided between expense and
/// income in the parent's proportions. The parts' expense always sums to
/// the parent's expense.
pub fn attribute(
    transactions: &[Transaction],
    splits: &HashMap<i64, Vec<TransactionSplit>>,
) -> Vec<Attribution> {
    let mut out = Vec::with_capacity(transactions.len());
    for t in transactions {
        match splits.get(&t.id).filter(|parts| !parts.is_empty()) {
            None => out.push(Attribution {
                transaction_id: t.id,
                purpose_id: t.category.deepest(),
                income: t.income,
                expense: t.expense,
            }),
            Some(parts) => {
                let total = t.total();
                let mut assigned = Decimal::ZERO;
                for (i, part) in parts.iter().enumerate() {
                    let expense = if total.is_zero() {
                        Decimal::ZERO
                    } else if i + 1 == parts.len() {
                        // last part takes the rounding remainder
                        t.expense - assigned
                    } else {
                        money(part.amount * t.expense / total)
                    };
                    assigned += expense;
                    out.push(Attribution {
                        transaction_id: t.id,
                        purpose_id: part.category.deepest(),
                        income: part.amount - expense,
                        expense,
                    });
                }
            }
        }
    }
    out
}

/// Expense attributed to `purpose_id` or anything below it.
pub fn attributed_expense(
    attributions: &[Attribution],
    taxonomy: &Taxonomy,
    purpose_id: i64,
) -> Decimal {
    let subtree = taxonomy.subtree(purpose_id);
    attributions
        .iter()
        .filter(|a| a.purpose_id.map(|p| subtree.contains(&p)).unwrap_or(false))
        .map(|a| a.expense)
        .sum()
}

/// Recomputes every derived figure of a budget from its allocations and the
/// attributed spend. Pure: the same inputs always give the same outputs.
pub fn derive_budget(
    budget: &Budget,
    allocations: &[BudgetAllocation],
    attributions: &[Attribution],
    taxonomy: &Taxonomy,
) -> (Budget, Vec<BudgetAllocation>) {
    let mut derived_allocations = Vec::with_capacity(allocations.len());
    let mut allocated_total = Decimal::ZERO;
    let mut spent_total = Decimal::ZERO;
    for a in allocations {
        let spent = attributed_expense(attributions, taxonomy, a.purpose_id);
        allocated_total += a.allocated_amount;
        spent_total += spent;
        derived_allocations.push(BudgetAllocation {
            spent_amount: spent,
            remaining_amount: a.allocated_amount - spent,
            ..a.clone()
        });
    }
    let derived = Budget {
        allocated_amount: allocated_total,
        spent_amount: spent_total,
        // relative to spend, not to what has been allocated
        remaining_amount: budget.total_budget - spent_total,
        ..budget.clone()
    };
    (derived, derived_allocations)
}

pub fn create_budget(
    conn: &Connection,
    caps: &dyn Capabilities,
    project_name: &str,
    budget_year: i32,
    total_budget: Decimal,
) -> Result<Budget> {
    ensure(caps, Operation::ManageBudgets)?;
    let project_name = project_name.trim();
    if project_name.is_empty() {
        return Err(LedgerError::validation("budget project name is required"));
    }
    if total_budget < Decimal::ZERO {
        return Err(LedgerError::validation("total budget cannot be negative"));
    }
    let total = money(total_budget);
    conn.execute(
        "INSERT INTO budgets(project_name, budget_year, total_budget, remaining_amount) VALUES (?1, ?2, ?3, ?4)",
        params![project_name, budget_year, total.to_string(), total.to_string()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(budget_id = id, project_name, budget_year, "budget created");
    get_budget(conn, id)
}

pub fn get_budget(conn: &Connection, id: i64) -> Result<Budget> {
    conn.query_row(
        &format!("SELECT {} FROM budgets WHERE id=?1", Budget::COLUMNS),
        params![id],
        Budget::from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("budget", id))
}

pub fn list_budgets(conn: &Connection, year: Option<i32>) -> Result<Vec<Budget>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM budgets WHERE (?1 IS NULL OR budget_year=?1) ORDER BY budget_year DESC, project_name",
        Budget::COLUMNS
    ))?;
    let rows = stmt.query_map(params![year], Budget::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn allocations_for(conn: &Connection, budget_id: i64) -> Result<Vec<BudgetAllocation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM budget_allocations WHERE budget_id=?1 ORDER BY id",
        BudgetAllocation::COLUMNS
    ))?;
    let rows = stmt.query_map(params![budget_id], BudgetAllocation::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn set_budget_status(
    conn: &Connection,
    caps: &dyn Capabilities,
    id: i64,
    status: BudgetStatus,
) -> Result<()> {
    ensure(caps, Operation::ManageBudgets)?;
    let n = conn.execute(
        "UPDATE budgets SET status=?1, version=version+1 WHERE id=?2",
        params![status.as_str(), id],
    )?;
    if n == 0 {
        return Err(LedgerError::not_found("budget", id));
    }
    Ok(())
}

pub fn delete_budget(conn: &Connection, caps: &dyn Capabilities, id: i64) -> Result<()> {
    ensure(caps, Operation::ManageBudgets)?;
    let n = conn.execute("DELETE FROM budgets WHERE id=?1", params![id])?;
    if n == 0 {
        return Err(LedgerError::not_found("budget", id));
    }
    tracing::info!(budget_id = id, "budget deleted");
    Ok(())
}

/// Changes the total and refreshes the derived figures in the same write.
pub fn set_budget_total(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    id: i64,
    total_budget: Decimal,
) -> Result<Budget> {
    ensure(caps, Operation::ManageBudgets)?;
    if total_budget < Decimal::ZERO {
        return Err(LedgerError::validation("total budget cannot be negative"));
    }
    retry_on_conflict(|| {
        with_write(conn, |db| {
            get_budget(db, id)?;
            db.execute(
                "UPDATE budgets SET total_budget=?1 WHERE id=?2",
                params![money(total_budget).to_string(), id],
            )?;
            recompute_budget(db, id)
        })
    })
}

/// Attaches `amount` for `purpose_id` to the budget, replacing an existing
/// allocation for the same purpose.
pub fn allocate(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    budget_id: i64,
    purpose_id: i64,
    amount: Decimal,
) -> Result<BudgetAllocation> {
    ensure(caps, Operation::ManageBudgets)?;
    if amount < Decimal::ZERO {
        return Err(LedgerError::validation("allocation cannot be negative"));
    }
    let amount = money(amount);
    retry_on_conflict(|| {
        with_write(conn, |db| {
            let budget = get_budget(db, budget_id)?;
            if budget.status == BudgetStatus::Closed {
                return Err(LedgerError::validation(format!(
                    "budget '{}' {} is closed",
                    budget.project_name, budget.budget_year
                )));
            }
            let taxonomy = Taxonomy::load(db)?;
            let purpose = taxonomy.node(purpose_id)?;
            for other in allocations_for(db, budget_id)? {
                if other.purpose_id == purpose_id {
                    continue;
                }
                if taxonomy.is_within(purpose_id, other.purpose_id)
                    || taxonomy.is_within(other.purpose_id, purpose_id)
                {
                    return Err(LedgerError::validation(format!(
                        "'{}' overlaps the existing allocation for '{}'",
                        purpose.name,
                        taxonomy.display_path(Some(other.purpose_id))
                    )));
                }
            }
            db.execute(
                "INSERT INTO budget_allocations(budget_id, purpose_id, allocated_amount) VALUES (?1, ?2, ?3)
                 ON CONFLICT(budget_id, purpose_id) DO UPDATE SET allocated_amount=excluded.allocated_amount",
                params![budget_id, purpose_id, amount.to_string()],
            )?;
            recompute_budget(db, budget_id)?;
            tracing::info!(budget_id, purpose_id, %amount, "allocation set");
            allocation(db, budget_id, purpose_id)?
                .ok_or_else(|| LedgerError::not_found("allocation", purpose_id))
        })
    })
}

pub fn unallocate(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    budget_id: i64,
    purpose_id: i64,
) -> Result<Budget> {
    ensure(caps, Operation::ManageBudgets)?;
    retry_on_conflict(|| {
        with_write(conn, |db| {
            get_budget(db, budget_id)?;
            let n = db.execute(
                "DELETE FROM budget_allocations WHERE budget_id=?1 AND purpose_id=?2",
                params![budget_id, purpose_id],
            )?;
            if n == 0 {
                return Err(LedgerError::not_found("allocation", purpose_id));
            }
            tracing::info!(budget_id, purpose_id, "allocation removed");
            recompute_budget(db, budget_id)
        })
    })
}

fn allocation(
    conn: &Connection,
    budget_id: i64,
    purpose_id: i64,
) -> Result<Option<BudgetAllocation>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM budget_allocations WHERE budget_id=?1 AND purpose_id=?2",
                BudgetAllocation::COLUMNS
            ),
            params![budget_id, purpose_id],
            BudgetAllocation::from_row,
        )
        .optional()?)
}

/// Reads the budget's inputs and derives its figures without writing.
fn derive_from_store(conn: &Connection, budget_id: i64) -> Result<(Budget, Vec<BudgetAllocation>, Taxonomy)> {
    let budget = get_budget(conn, budget_id)?;
    let allocations = allocations_for(conn, budget_id)?;
    let taxonomy = Taxonomy::load(conn)?;
    let txs = transactions_in_year(conn, budget.budget_year)?;
    let ids: Vec<i64> = txs.iter().map(|t| t.id).collect();
    let splits = splits_by_transaction(conn, &ids)?;
    let attributions = attribute(&txs, &splits);
    let (derived, derived_allocations) =
        derive_budget(&budget, &allocations, &attributions, &taxonomy);
    Ok((derived, derived_allocations, taxonomy))
}

/// Writes freshly derived figures for the budget and all its allocations.
/// Must run inside a write transaction.
fn recompute_budget(conn: &Connection, budget_id: i64) -> Result<Budget> {
    let (derived, allocations, _) = derive_from_store(conn, budget_id)?;
    for a in &allocations {
        conn.execute(
            "UPDATE budget_allocations SET spent_amount=?1, remaining_amount=?2 WHERE id=?3",
            params![a.spent_amount.to_string(), a.remaining_amount.to_string(), a.id],
        )?;
    }
    let n = conn.execute(
        "UPDATE budgets SET allocated_amount=?1, spent_amount=?2, remaining_amount=?3, version=version+1
         WHERE id=?4 AND version=?5",
        params![
            derived.allocated_amount.to_string(),
            derived.spent_amount.to_string(),
            derived.remaining_amount.to_string(),
            budget_id,
            derived.version
        ],
    )?;
    if n == 0 {
        return Err(LedgerError::ConcurrencyConflict {
            entity: "budget",
            id: budget_id,
        });
    }
    get_budget(conn, budget_id)
}

/// Re-derives the stored figures of every budget for `budget_year`. Must run
/// inside the write that changed transactions or splits of that year.
pub(crate) fn refresh_year(conn: &Connection, budget_year: i32) -> Result<()> {
    let mut stmt = conn.prepare("SELECT id FROM budgets WHERE budget_year=?1 ORDER BY id")?;
    let ids = stmt
        .query_map(params![budget_year], |r| r.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for id in ids {
        recompute_budget(conn, id)?;
    }
    Ok(())
}

/// Re-derives and stores a budget's figures. Running it twice without an
/// intervening change stores the same amounts.
pub fn refresh_budget(conn: &mut Connection, budget_id: i64) -> Result<Budget> {
    retry_on_conflict(|| with_write(conn, |db| recompute_budget(db, budget_id)))
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationView {
    pub purpose_id: i64,
    pub purpose_path: String,
    pub allocated_amount: Decimal,
    pub spent_amount: Decimal,
    pub remaining_amount: Decimal,
    pub utilization: Utilization,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetView {
    pub budget: Budget,
    pub utilization: Utilization,
    pub allocations: Vec<AllocationView>,
}

/// Live status of a budget, derived from one snapshot of the store.
pub fn budget_status(conn: &Connection, budget_id: i64) -> Result<BudgetView> {
    with_snapshot(conn, |db| {
        let (budget, allocations, taxonomy) = derive_from_store(db, budget_id)?;
        let views = allocations
            .iter()
            .map(|a| AllocationView {
                purpose_id: a.purpose_id,
                purpose_path: taxonomy.display_path(Some(a.purpose_id)),
                allocated_amount: a.allocated_amount,
                spent_amount: a.spent_amount,
                remaining_amount: a.remaining_amount,
                utilization: Utilization::of(a.spent_amount, a.allocated_amount),
            })
            .collect();
        Ok(BudgetView {
            utilization: Utilization::of(budget.spent_amount, budget.total_budget),
            budget,
            allocations: views,
        })
    })
}
