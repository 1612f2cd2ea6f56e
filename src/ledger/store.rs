// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Bank accounts and transactions: validated writes and filtered reads.

use std::collections::{BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::budgets::refresh_year;
use super::taxonomy::Taxonomy;
use super::{BatchOutcome, with_snapshot, with_write};
use crate::errors::{LedgerError, Result, retry_on_conflict};
use crate::models::{BankAccount, CategoryTriple, Transaction, TransactionSplit};
use crate::permissions::{Capabilities, Operation, ensure};
use crate::utils::money;

pub fn create_account(
    conn: &Connection,
    caps: &dyn Capabilities,
    name: &str,
    account_type: &str,
    initial_amount: Decimal,
) -> Result<BankAccount> {
    ensure(caps, Operation::ManageAccounts)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("account name is required"));
    }
    let account_type = account_type.trim();
    if account_type.is_empty() {
        return Err(LedgerError::validation("account type is required"));
    }
    conn.execute(
        "INSERT INTO bank_accounts(account_name, account_type, initial_amount) VALUES (?1, ?2, ?3)",
        params![name, account_type, money(initial_amount).to_string()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(account_id = id, name, "bank account created");
    get_account(conn, id)
}

pub fn get_account(conn: &Connection, id: i64) -> Result<BankAccount> {
    conn.query_row(
        &format!("SELECT {} FROM bank_accounts WHERE id=?1", BankAccount::COLUMNS),
        params![id],
        BankAccount::from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("bank account", id))
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<BankAccount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM bank_accounts ORDER BY account_name",
        BankAccount::COLUMNS
    ))?;
    let rows = stmt.query_map([], BankAccount::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Removes the account together with its transactions and their splits.
pub fn delete_account(conn: &Connection, caps: &dyn Capabilities, id: i64) -> Result<()> {
    ensure(caps, Operation::ManageAccounts)?;
    let tx = conn.unchecked_transaction()?;
    let years = {
        let mut stmt =
            tx.prepare("SELECT DISTINCT audit_year FROM transactions WHERE bank_account_id=?1")?;
        stmt.query_map(params![id], |r| r.get::<_, i32>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    let n = tx.execute("DELETE FROM bank_accounts WHERE id=?1", params![id])?;
    if n == 0 {
        return Err(LedgerError::not_found("bank account", id));
    }
    for year in years {
        refresh_year(&tx, year)?;
    }
    tx.commit()?;
    tracing::info!(account_id = id, "bank account deleted");
    Ok(())
}

/// Marks the account's balances stale. Called in the same write as every
/// transaction mutation.
pub(crate) fn bump_revision(conn: &Connection, account_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE bank_accounts SET revision = revision + 1 WHERE id=?1",
        params![account_id],
    )?;
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDraft {
    pub bank_account_id: i64,
    pub date: NaiveDate,
    pub main_description: String,
    #[serde(default)]
    pub sub_description: Option<String>,
    #[serde(default)]
    pub income: Decimal,
    #[serde(default)]
    pub expense: Decimal,
    #[serde(default)]
    pub payer_payee: Option<String>,
    /// Purpose at any level; the full triple is derived from it.
    #[serde(default)]
    pub purpose_id: Option<i64>,
    #[serde(default)]
    pub project_account: Option<String>,
    #[serde(default)]
    pub audit_year: Option<i32>,
    #[serde(default)]
    pub reference_no: Option<String>,
}

impl TransactionDraft {
    pub fn new(bank_account_id: i64, date: NaiveDate, main_description: impl Into<String>) -> Self {
        TransactionDraft {
            bank_account_id,
            date,
            main_description: main_description.into(),
            sub_description: None,
            income: Decimal::ZERO,
            expense: Decimal::ZERO,
            payer_payee: None,
            purpose_id: None,
            project_account: None,
            audit_year: None,
            reference_no: None,
        }
    }

    pub fn income(mut self, amount: Decimal) -> Self {
        self.income = amount;
        self
    }

    pub fn expense(mut self, amount: Decimal) -> Self {
        self.expense = amount;
        self
    }

    pub fn purpose(mut self, purpose_id: i64) -> Self {
        self.purpose_id = Some(purpose_id);
        self
    }

    pub fn payer_payee(mut self, who: impl Into<String>) -> Self {
        self.payer_payee = Some(who.into());
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project_account = Some(project.into());
        self
    }
}

/// Field changes for [`update_transaction`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub bank_account_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub main_description: Option<String>,
    pub sub_description: Option<Option<String>>,
    pub income: Option<Decimal>,
    pub expense: Option<Decimal>,
    pub payer_payee: Option<Option<String>>,
    pub purpose_id: Option<Option<i64>>,
    pub project_account: Option<Option<String>>,
    pub audit_year: Option<i32>,
    pub reference_no: Option<Option<String>>,
    /// When set, the update only applies if the stored version still matches.
    pub expected_version: Option<i64>,
}

fn clean(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_amounts(income: Decimal, expense: Decimal) -> Result<()> {
    if income < Decimal::ZERO {
        return Err(LedgerError::validation("income cannot be negative"));
    }
    if expense < Decimal::ZERO {
        return Err(LedgerError::validation("expense cannot be negative"));
    }
    if !income.is_zero() && !expense.is_zero() {
        tracing::warn!(%income, %expense, "transaction records both income and expense");
    }
    Ok(())
}

fn triple_for(conn: &Connection, purpose_id: Option<i64>) -> Result<CategoryTriple> {
    match purpose_id {
        Some(id) => Taxonomy::load(conn)?.derive_ancestors(id),
        None => Ok(CategoryTriple::default()),
    }
}

pub fn create_transaction(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    draft: TransactionDraft,
) -> Result<Transaction> {
    ensure(caps, Operation::EditTransactions)?;
    let main_description = draft.main_description.trim().to_string();
    if main_description.is_empty() {
        return Err(LedgerError::validation("main description is required"));
    }
    let income = money(draft.income);
    let expense = money(draft.expense);
    check_amounts(income, expense)?;
    let audit_year = draft.audit_year.unwrap_or_else(|| draft.date.year());

    with_write(conn, |tx| {
        get_account(tx, draft.bank_account_id)?;
        let category = triple_for(tx, draft.purpose_id)?;
        tx.execute(
            "INSERT INTO transactions(bank_account_id, date, main_description, sub_description, income, expense, payer_payee, main_purpose_id, business_purpose_id, specific_purpose_id, project_account, audit_year, reference_no)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                draft.bank_account_id,
                draft.date,
                main_description,
                clean(draft.sub_description.clone()),
                income.to_string(),
                expense.to_string(),
                clean(draft.payer_payee.clone()),
                category.main,
                category.business,
                category.specific,
                clean(draft.project_account.clone()),
                audit_year,
                clean(draft.reference_no.clone()),
            ],
        )?;
        let id = tx.last_insert_rowid();
        bump_revision(tx, draft.bank_account_id)?;
        refresh_year(tx, audit_year)?;
        tracing::info!(transaction_id = id, account_id = draft.bank_account_id, "transaction created");
        get_transaction(tx, id)
    })
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    conn.query_row(
        &format!("SELECT {} FROM transactions WHERE id=?1", Transaction::COLUMNS),
        params![id],
        Transaction::from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("transaction", id))
}

pub(crate) fn has_splits(conn: &Connection, transaction_id: i64) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transaction_splits WHERE transaction_id=?1",
        params![transaction_id],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

pub fn update_transaction(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    id: i64,
    patch: TransactionPatch,
) -> Result<Transaction> {
    ensure(caps, Operation::EditTransactions)?;
    with_write(conn, |tx| {
        let current = get_transaction(tx, id)?;
        if let Some(expected) = patch.expected_version {
            if expected != current.version {
                return Err(LedgerError::ConcurrencyConflict {
                    entity: "transaction",
                    id,
                });
            }
        }
        let split = has_splits(tx, id)?;
        let mut next = current.clone();

        if let Some(account_id) = patch.bank_account_id {
            get_account(tx, account_id)?;
            next.bank_account_id = account_id;
        }
        if let Some(date) = patch.date {
            next.date = date;
        }
        if let Some(desc) = patch.main_description.clone() {
            let desc = desc.trim().to_string();
            if desc.is_empty() {
                return Err(LedgerError::validation("main description is required"));
            }
            next.main_description = desc;
        }
        if let Some(sub) = patch.sub_description.clone() {
            next.sub_description = clean(sub);
        }
        if let Some(v) = patch.income {
            next.income = money(v);
        }
        if let Some(v) = patch.expense {
            next.expense = money(v);
        }
        check_amounts(next.income, next.expense)?;
        if split && next.total() != current.total() {
            return Err(LedgerError::validation(
                "amount of a split transaction cannot change; remove the split first",
            ));
        }
        if let Some(who) = patch.payer_payee.clone() {
            if split && who.is_some() {
                return Err(LedgerError::validation(
                    "payer/payee of a split transaction is carried by its parts",
                ));
            }
            next.payer_payee = clean(who);
        }
        if let Some(purpose) = patch.purpose_id {
            if split && purpose.is_some() {
                return Err(LedgerError::validation(
                    "purpose of a split transaction is carried by its parts",
                ));
            }
            next.category = triple_for(tx, purpose)?;
        }
        if let Some(project) = patch.project_account.clone() {
            next.project_account = clean(project);
        }
        if let Some(year) = patch.audit_year {
            next.audit_year = year;
        }
        if let Some(reference) = patch.reference_no.clone() {
            next.reference_no = clean(reference);
        }

        let n = tx.execute(
            "UPDATE transactions SET bank_account_id=?1, date=?2, main_description=?3, sub_description=?4, income=?5, expense=?6, payer_payee=?7, main_purpose_id=?8, business_purpose_id=?9, specific_purpose_id=?10, project_account=?11, audit_year=?12, reference_no=?13, version=version+1
             WHERE id=?14 AND version=?15",
            params![
                next.bank_account_id,
                next.date,
                next.main_description,
                next.sub_description,
                next.income.to_string(),
                next.expense.to_string(),
                next.payer_payee,
                next.category.main,
                next.category.business,
                next.category.specific,
                next.project_account,
                next.audit_year,
                next.reference_no,
                id,
                current.version,
            ],
        )?;
        if n == 0 {
            return Err(LedgerError::ConcurrencyConflict {
                entity: "transaction",
                id,
            });
        }
        bump_revision(tx, current.bank_account_id)?;
        if next.bank_account_id != current.bank_account_id {
            bump_revision(tx, next.bank_account_id)?;
        }
        refresh_year(tx, current.audit_year)?;
        if next.audit_year != current.audit_year {
            refresh_year(tx, next.audit_year)?;
        }
        tracing::info!(transaction_id = id, "transaction updated");
        get_transaction(tx, id)
    })
}

/// Deletes the transaction; its splits and split archive go with it.
pub fn delete_transaction(conn: &mut Connection, caps: &dyn Capabilities, id: i64) -> Result<()> {
    ensure(caps, Operation::EditTransactions)?;
    with_write(conn, |tx| {
        let current = get_transaction(tx, id)?;
        tx.execute("DELETE FROM transactions WHERE id=?1", params![id])?;
        bump_revision(tx, current.bank_account_id)?;
        refresh_year(tx, current.audit_year)?;
        tracing::info!(transaction_id = id, "transaction deleted");
        Ok(())
    })
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Matches the purpose and everything below it, on the transaction or any
    /// of its split parts.
    pub purpose_id: Option<i64>,
    /// Case-insensitive text matched against descriptions and payer/payee.
    pub search: Option<String>,
    pub project_account: Option<String>,
    pub audit_year: Option<i32>,
    pub limit: Option<usize>,
}

/// Transactions matching `filter`, newest first.
pub fn list_transactions(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    with_snapshot(conn, |conn| {
        let mut rows = query_transactions(conn, filter)?;
        if let Some(purpose_id) = filter.purpose_id {
            let taxonomy = Taxonomy::load(conn)?;
            let subtree = taxonomy.subtree(purpose_id);
            let ids: Vec<i64> = rows.iter().map(|t| t.id).collect();
            let splits = splits_by_transaction(conn, &ids)?;
            rows.retain(|t| matches_purpose(t, splits.get(&t.id), &subtree));
        }
        if let Some(needle) = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
        {
            rows.retain(|t| matches_text(t, &needle));
        }
        rows.reverse();
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    })
}

fn matches_purpose(
    t: &Transaction,
    parts: Option<&Vec<TransactionSplit>>,
    subtree: &BTreeSet<i64>,
) -> bool {
    let own = t
        .category
        .deepest()
        .map(|id| subtree.contains(&id))
        .unwrap_or(false);
    own || parts
        .map(|ps| {
            ps.iter()
                .filter_map(|p| p.category.deepest())
                .any(|id| subtree.contains(&id))
        })
        .unwrap_or(false)
}

fn matches_text(t: &Transaction, needle: &str) -> bool {
    [
        Some(t.main_description.as_str()),
        t.sub_description.as_deref(),
        t.payer_payee.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}

/// Equality/range filtering done by the store, oldest first.
fn query_transactions(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    let mut sql = format!("SELECT {} FROM transactions WHERE 1=1", Transaction::COLUMNS);
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(account_id) = filter.account_id {
        sql.push_str(" AND bank_account_id=?");
        args.push(Box::new(account_id));
    }
    if let Some(from) = filter.from {
        sql.push_str(" AND date>=?");
        args.push(Box::new(from));
    }
    if let Some(to) = filter.to {
        sql.push_str(" AND date<=?");
        args.push(Box::new(to));
    }
    if let Some(project) = filter.project_account.as_deref() {
        sql.push_str(" AND project_account=?");
        args.push(Box::new(project.trim().to_string()));
    }
    if let Some(year) = filter.audit_year {
        sql.push_str(" AND audit_year=?");
        args.push(Box::new(year));
    }
    sql.push_str(" ORDER BY date, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
        Transaction::from_row,
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Every transaction of one account, oldest first.
pub(crate) fn account_transactions(conn: &Connection, account_id: i64) -> Result<Vec<Transaction>> {
    query_transactions(
        conn,
        &TransactionFilter {
            account_id: Some(account_id),
            ..Default::default()
        },
    )
}

pub(crate) fn transactions_in_year(conn: &Connection, year: i32) -> Result<Vec<Transaction>> {
    query_transactions(
        conn,
        &TransactionFilter {
            audit_year: Some(year),
            ..Default::default()
        },
    )
}

pub(crate) fn transactions_between(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Transaction>> {
    query_transactions(
        conn,
        &TransactionFilter {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        },
    )
}

/// Transactions whose project field equals `key` exactly, oldest first.
pub(crate) fn transactions_with_project(conn: &Connection, key: &str) -> Result<Vec<Transaction>> {
    query_transactions(
        conn,
        &TransactionFilter {
            project_account: Some(key.to_string()),
            ..Default::default()
        },
    )
}

pub(crate) fn splits_for(conn: &Connection, transaction_id: i64) -> Result<Vec<TransactionSplit>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM transaction_splits WHERE transaction_id=?1 ORDER BY split_index",
        TransactionSplit::COLUMNS
    ))?;
    let rows = stmt.query_map(params![transaction_id], TransactionSplit::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub(crate) fn splits_by_transaction(
    conn: &Connection,
    ids: &[i64],
) -> Result<HashMap<i64, Vec<TransactionSplit>>> {
    let mut out = HashMap::new();
    for &id in ids {
        let parts = splits_for(conn, id)?;
        if !parts.is_empty() {
            out.insert(id, parts);
        }
    }
    Ok(out)
}

/// Points each transaction at `purpose_id`. Items are written independently:
/// one failure leaves the others applied.
pub fn reassign_purpose(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    ids: &[i64],
    purpose_id: i64,
) -> Result<BatchOutcome> {
    ensure(caps, Operation::EditTransactions)?;
    let category = Taxonomy::load(conn)?.derive_ancestors(purpose_id)?;
    let mut outcome = BatchOutcome::default();
    for &id in ids {
        let result = retry_on_conflict(|| reassign_one(conn, id, category));
        outcome.record(id, result);
    }
    tracing::info!(
        purpose_id,
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "bulk purpose reassignment finished"
    );
    Ok(outcome)
}

fn reassign_one(conn: &mut Connection, id: i64, category: CategoryTriple) -> Result<()> {
    with_write(conn, |tx| {
        let current = get_transaction(tx, id)?;
        if has_splits(tx, id)? {
            return Err(LedgerError::validation(
                "split transaction; reassign its parts instead",
            ));
        }
        let n = tx.execute(
            "UPDATE transactions SET main_purpose_id=?1, business_purpose_id=?2, specific_purpose_id=?3, version=version+1
             WHERE id=?4 AND version=?5",
            params![category.main, category.business, category.specific, id, current.version],
        )?;
        if n == 0 {
            return Err(LedgerError::ConcurrencyConflict {
                entity: "transaction",
                id,
            });
        }
        bump_revision(tx, current.bank_account_id)?;
        refresh_year(tx, current.audit_year)
    })
}
