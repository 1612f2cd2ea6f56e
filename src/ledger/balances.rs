// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Chronological running balance per bank account.
//!
//! Only parent transactions move a balance. Split parts re-describe an amount
//! the parent already carries and are never read here.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use super::store::{account_transactions, get_account, list_accounts};
use super::with_snapshot;
use crate::errors::Result;
use crate::models::{BankAccount, Transaction};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceLine {
    pub transaction_id: i64,
    pub date: NaiveDate,
    pub income: Decimal,
    pub expense: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunningBalances {
    pub account_id: i64,
    pub opening: Decimal,
    pub lines: Vec<BalanceLine>,
    pub closing: Decimal,
}

impl RunningBalances {
    pub fn balance_after(&self, transaction_id: i64) -> Option<Decimal> {
        self.lines
            .iter()
            .find(|l| l.transaction_id == transaction_id)
            .map(|l| l.balance)
    }

    /// Transaction id → balance right after it.
    pub fn as_map(&self) -> BTreeMap<i64, Decimal> {
        self.lines
            .iter()
            .map(|l| (l.transaction_id, l.balance))
            .collect()
    }

    /// Balance at the end of `date`.
    pub fn as_of(&self, date: NaiveDate) -> Decimal {
        self.lines
            .iter()
            .take_while(|l| l.date <= date)
            .last()
            .map(|l| l.balance)
            .unwrap_or(self.opening)
    }
}

/// Orders by date, then id, so transactions on the same day always
/// accumulate in creation order.
pub fn running_balances(account: &BankAccount, transactions: &[Transaction]) -> RunningBalances {
    let mut ordered: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.bank_account_id == account.id)
        .collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

    let mut balance = account.initial_amount;
    let mut lines = Vec::with_capacity(ordered.len());
    for t in ordered {
        balance += t.income - t.expense;
        lines.push(BalanceLine {
            transaction_id: t.id,
            date: t.date,
            income: t.income,
            expense: t.expense,
            balance,
        });
    }
    RunningBalances {
        account_id: account.id,
        opening: account.initial_amount,
        lines,
        closing: balance,
    }
}

pub fn compute_running_balances(conn: &Connection, account_id: i64) -> Result<RunningBalances> {
    with_snapshot(conn, |db| {
        let account = get_account(db, account_id)?;
        let txs = account_transactions(db, account_id)?;
        Ok(running_balances(&account, &txs))
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub account_id: i64,
    pub account_name: String,
    pub account_type: String,
    pub opening: Decimal,
    pub closing: Decimal,
    pub transaction_count: usize,
}

/// Closing balance of every account, read from one snapshot.
pub fn account_balances(conn: &Connection) -> Result<Vec<AccountBalance>> {
    with_snapshot(conn, |db| {
        let mut out = Vec::new();
        for account in list_accounts(db)? {
            let txs = account_transactions(db, account.id)?;
            let rb = running_balances(&account, &txs);
            out.push(AccountBalance {
                account_id: account.id,
                account_name: account.account_name.clone(),
                account_type: account.account_type.clone(),
                opening: rb.opening,
                closing: rb.closing,
                transaction_count: rb.lines.len(),
            });
        }
        Ok(out)
    })
}

/// Running balances memoized per account revision. Any transaction write in
/// an account bumps its revision, which retires the cached entry.
#[derive(Debug, Default)]
pub struct BalanceCache {
    entries: HashMap<i64, (i64, RunningBalances)>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&mut self, conn: &Connection, account_id: i64) -> Result<RunningBalances> {
        let entries = &mut self.entries;
        with_snapshot(conn, |db| {
            let account = get_account(db, account_id)?;
            if let Some((revision, cached)) = entries.get(&account_id) {
                if *revision == account.revision {
                    tracing::debug!(account_id, revision, "balance cache hit");
                    return Ok(cached.clone());
                }
            }
            let txs = account_transactions(db, account_id)?;
            let computed = running_balances(&account, &txs);
            entries.insert(account_id, (account.revision, computed.clone()));
            Ok(computed)
        })
    }

    pub fn invalidate(&mut self, account_id: i64) {
        self.entries.remove(&account_id);
    }

    pub fn cached_revision(&self, account_id: i64) -> Option<i64> {
        self.entries.get(&account_id).map(|(rev, _)| *rev)
    }
}
