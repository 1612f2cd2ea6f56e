// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::LedgerError;
use crate::ledger::BatchOutcome;
use crate::ledger::store::{TransactionDraft, create_transaction};
use crate::ledger::taxonomy::Taxonomy;
use crate::permissions::{Capabilities, Operation, ensure};
use crate::utils::{parse_date, parse_decimal, pretty_table, required, resolve_account, resolve_project};
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::{HashMap, hash_map::Entry};

pub fn handle(conn: &mut Connection, caps: &dyn Capabilities, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => {
            let path = required::<String>(sub, "path")?.trim().to_string();
            let outcome = import_transactions(conn, caps, &path)?;
            println!(
                "Imported {} transaction(s) from {}, {} row(s) failed",
                outcome.succeeded.len(),
                path,
                outcome.failed.len()
            );
            if !outcome.failed.is_empty() {
                let rows = outcome
                    .failed
                    .iter()
                    .map(|f| vec![f.item.to_string(), f.reason.clone()])
                    .collect();
                println!("{}", pretty_table(&["Row", "Reason"], rows));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
struct ImportRow {
    date: String,
    account: String,
    description: String,
    #[serde(default)]
    income: String,
    #[serde(default)]
    expense: String,
    #[serde(default)]
    payee: String,
    #[serde(default)]
    purpose: String,
    #[serde(default)]
    project: String,
    #[serde(default)]
    reference: String,
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s.trim()).filter(|s| !s.is_empty())
}

struct Lookups {
    accounts: HashMap<String, i64>,
    projects: HashMap<String, String>,
    /// Lowercased path to purpose ids; more than one id means the path is
    /// ambiguous.
    purposes: HashMap<String, Vec<i64>>,
}

impl Lookups {
    fn new(conn: &Connection) -> Result<Self> {
        let taxonomy = Taxonomy::load(conn)?;
        let mut purposes: HashMap<String, Vec<i64>> = HashMap::new();
        for n in taxonomy.nodes() {
            purposes
                .entry(taxonomy.display_path(Some(n.id)).to_lowercase())
                .or_default()
                .push(n.id);
        }
        Ok(Lookups {
            accounts: HashMap::new(),
            projects: HashMap::new(),
            purposes,
        })
    }

    fn account(&mut self, conn: &Connection, raw: &str) -> Result<i64> {
        match self.accounts.entry(raw.trim().to_string()) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let id = resolve_account(conn, entry.key())?;
                Ok(*entry.insert(id))
            }
        }
    }

    fn project(&mut self, conn: &Connection, raw: &str) -> Result<String> {
        match self.projects.entry(raw.trim().to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let id = resolve_project(conn, entry.key())?;
                Ok(entry.insert(id.to_string()).clone())
            }
        }
    }

    /// Purpose by id or by its `Main > Business > Specific` path.
    fn purpose(&self, raw: &str) -> Result<i64> {
        if let Ok(id) = raw.trim().parse::<i64>() {
            return Ok(id);
        }
        match self.purposes.get(&raw.trim().to_lowercase()).map(Vec::as_slice) {
            Some([id]) => Ok(*id),
            Some(ids) if !ids.is_empty() => Err(anyhow!(
                "Purpose '{}' matches {} purposes; use the id",
                raw.trim(),
                ids.len()
            )),
            _ => Err(anyhow!("Purpose '{}' not found", raw.trim())),
        }
    }
}

fn draft_from_row(conn: &Connection, lookups: &mut Lookups, row: &ImportRow) -> Result<TransactionDraft> {
    let date = parse_date(&row.date)?;
    let account_id = lookups.account(conn, &row.account)?;
    let mut draft = TransactionDraft::new(account_id, date, row.description.trim());
    if let Some(v) = non_empty(&row.income) {
        draft = draft.income(parse_decimal(v)?);
    }
    if let Some(v) = non_empty(&row.expense) {
        draft = draft.expense(parse_decimal(v)?);
    }
    if let Some(v) = non_empty(&row.payee) {
        draft = draft.payer_payee(v);
    }
    if let Some(v) = non_empty(&row.purpose) {
        draft = draft.purpose(lookups.purpose(v)?);
    }
    if let Some(v) = non_empty(&row.project) {
        draft = draft.project(lookups.project(conn, v)?);
    }
    draft.reference_no = non_empty(&row.reference).map(str::to_string);
    Ok(draft)
}

/// Imports each CSV row as its own write. A bad row is reported by its
/// 1-based data row number and does not stop the others.
pub fn import_transactions(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    path: &str,
) -> Result<BatchOutcome> {
    ensure(caps, Operation::EditTransactions)?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Open CSV {}", path))?;
    let mut lookups = Lookups::new(conn)?;
    let mut outcome = BatchOutcome::default();

    for (idx, result) in rdr.deserialize::<ImportRow>().enumerate() {
        let row_no = idx as i64 + 1;
        let written = result
            .map_err(anyhow::Error::from)
            .and_then(|row| draft_from_row(conn, &mut lookups, &row))
            .map_err(|e| LedgerError::validation(e.to_string()))
            .and_then(|draft| create_transaction(conn, caps, draft).map(|_| ()));
        outcome.record(row_no, written);
    }
    tracing::info!(
        path,
        imported = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "csv import finished"
    );
    Ok(outcome)
}
