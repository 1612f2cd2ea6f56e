// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::store::{
    TransactionDraft, TransactionFilter, TransactionPatch, create_transaction, delete_transaction,
    list_accounts, list_transactions, reassign_purpose, splits_by_transaction,
    update_transaction,
};
use crate::ledger::taxonomy::Taxonomy;
use crate::permissions::Capabilities;
use crate::utils::{
    maybe_print_json, parse_date, parse_decimal, pretty_table, required, resolve_account,
    resolve_project,
};
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

pub fn handle(conn: &mut Connection, caps: &dyn Capabilities, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, caps, sub)?,
        Some(("edit", sub)) => edit(conn, caps, sub)?,
        Some(("rm", sub)) => {
            let id = *required::<i64>(sub, "id")?;
            delete_transaction(conn, caps, id)?;
            println!("Deleted transaction {}", id);
        }
        Some(("list", sub)) => list(conn, sub)?,
        Some(("reassign", sub)) => reassign(conn, caps, sub)?,
        _ => {}
    }
    Ok(())
}

fn opt_string(sub: &clap::ArgMatches, id: &str) -> Option<String> {
    sub.get_one::<String>(id).map(|s| s.to_string())
}

/// Project references are stored by id; names are resolved first.
fn project_key(conn: &Connection, raw: Option<&String>) -> Result<Option<String>> {
    raw.map(|p| resolve_project(conn, p).map(|id| id.to_string()))
        .transpose()
}

fn add(conn: &mut Connection, caps: &dyn Capabilities, sub: &clap::ArgMatches) -> Result<()> {
    let account_id = resolve_account(conn, required::<String>(sub, "account")?)?;
    let date = parse_date(required::<String>(sub, "date")?)?;
    let desc = required::<String>(sub, "desc")?;

    let mut draft = TransactionDraft::new(account_id, date, desc.as_str());
    if let Some(v) = sub.get_one::<String>("income") {
        draft = draft.income(parse_decimal(v)?);
    }
    if let Some(v) = sub.get_one::<String>("expense") {
        draft = draft.expense(parse_decimal(v)?);
    }
    draft.sub_description = opt_string(sub, "sub-desc");
    draft.payer_payee = opt_string(sub, "payee");
    draft.purpose_id = sub.get_one::<i64>("purpose").copied();
    draft.project_account = project_key(conn, sub.get_one::<String>("project"))?;
    draft.audit_year = sub.get_one::<i32>("audit-year").copied();
    draft.reference_no = opt_string(sub, "ref");

    let tx = create_transaction(conn, caps, draft)?;
    println!(
        "Recorded transaction {} on {}: +{} / -{} '{}'",
        tx.id, tx.date, tx.income, tx.expense, tx.main_description
    );
    Ok(())
}

fn edit(conn: &mut Connection, caps: &dyn Capabilities, sub: &clap::ArgMatches) -> Result<()> {
    let id = *required::<i64>(sub, "id")?;
    let mut patch = TransactionPatch {
        expected_version: sub.get_one::<i64>("expect-version").copied(),
        ..Default::default()
    };
    if let Some(raw) = sub.get_one::<String>("account") {
        patch.bank_account_id = Some(resolve_account(conn, raw)?);
    }
    if let Some(raw) = sub.get_one::<String>("date") {
        patch.date = Some(parse_date(raw)?);
    }
    patch.main_description = opt_string(sub, "desc");
    if let Some(v) = sub.get_one::<String>("sub-desc") {
        patch.sub_description = Some(Some(v.clone()));
    }
    if let Some(v) = sub.get_one::<String>("income") {
        patch.income = Some(parse_decimal(v)?);
    }
    if let Some(v) = sub.get_one::<String>("expense") {
        patch.expense = Some(parse_decimal(v)?);
    }
    if let Some(v) = sub.get_one::<String>("payee") {
        patch.payer_payee = Some(Some(v.clone()));
    }
    if let Some(p) = sub.get_one::<i64>("purpose") {
        patch.purpose_id = Some(Some(*p));
    } else if sub.get_flag("clear-purpose") {
        patch.purpose_id = Some(None);
    }
    if sub.get_one::<String>("project").is_some() {
        patch.project_account = Some(project_key(conn, sub.get_one::<String>("project"))?);
    }
    patch.audit_year = sub.get_one::<i32>("audit-year").copied();
    if let Some(v) = sub.get_one::<String>("ref") {
        patch.reference_no = Some(Some(v.clone()));
    }

    let tx = update_transaction(conn, caps, id, patch)?;
    println!("Updated transaction {} (version {})", tx.id, tx.version);
    Ok(())
}

/// Builds the store filter from `tx list` arguments.
pub fn filter_from_args(conn: &Connection, sub: &clap::ArgMatches) -> Result<TransactionFilter> {
    Ok(TransactionFilter {
        account_id: sub
            .get_one::<String>("account")
            .map(|raw| resolve_account(conn, raw))
            .transpose()?,
        from: sub
            .get_one::<String>("from")
            .map(|s| parse_date(s))
            .transpose()?,
        to: sub
            .get_one::<String>("to")
            .map(|s| parse_date(s))
            .transpose()?,
        purpose_id: sub.get_one::<i64>("purpose").copied(),
        search: opt_string(sub, "search"),
        project_account: project_key(conn, sub.get_one::<String>("project"))?,
        audit_year: sub.get_one::<i32>("audit-year").copied(),
        limit: sub.get_one::<usize>("limit").copied(),
    })
}

#[derive(Serialize)]
pub struct TransactionRow {
    pub id: i64,
    pub date: String,
    pub account: String,
    pub description: String,
    pub income: String,
    pub expense: String,
    pub payer_payee: String,
    pub purpose: String,
    pub project: String,
    pub split_parts: usize,
}

pub fn query_rows(conn: &Connection, sub: &clap::ArgMatches) -> Result<Vec<TransactionRow>> {
    let filter = filter_from_args(conn, sub)?;
    let txs = list_transactions(conn, &filter)?;
    let taxonomy = Taxonomy::load(conn)?;
    let accounts: HashMap<i64, String> = list_accounts(conn)?
        .into_iter()
        .map(|a| (a.id, a.account_name))
        .collect();
    let ids: Vec<i64> = txs.iter().map(|t| t.id).collect();
    let splits = splits_by_transaction(conn, &ids)?;

    let mut data = Vec::with_capacity(txs.len());
    for t in txs {
        let parts = splits.get(&t.id).map(|p| p.len()).unwrap_or(0);
        let purpose = if parts > 0 {
            format!("(split into {})", parts)
        } else {
            taxonomy.display_path(t.category.deepest())
        };
        data.push(TransactionRow {
            id: t.id,
            date: t.date.to_string(),
            account: accounts
                .get(&t.bank_account_id)
                .cloned()
                .unwrap_or_default(),
            description: t.main_description,
            income: t.income.to_string(),
            expense: t.expense.to_string(),
            payer_payee: t.payer_payee.unwrap_or_default(),
            purpose,
            project: t.project_account.unwrap_or_default(),
            split_parts: parts,
        });
    }
    Ok(data)
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let data = query_rows(conn, sub)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.date.clone(),
                    r.account.clone(),
                    r.description.clone(),
                    r.income.clone(),
                    r.expense.clone(),
                    r.payer_payee.clone(),
                    r.purpose.clone(),
                    r.project.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &[
                    "Id", "Date", "Account", "Description", "Income", "Expense", "Payer/Payee",
                    "Purpose", "Project",
                ],
                rows,
            )
        );
    }
    Ok(())
}

fn reassign(conn: &mut Connection, caps: &dyn Capabilities, sub: &clap::ArgMatches) -> Result<()> {
    let purpose_id = *required::<i64>(sub, "purpose")?;
    let ids: Vec<i64> = sub
        .get_many::<i64>("ids")
        .map(|v| v.copied().collect())
        .unwrap_or_default();
    let outcome = reassign_purpose(conn, caps, &ids, purpose_id)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &outcome)? {
        println!(
            "Reassigned {} transaction(s), {} failed",
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        if !outcome.failed.is_empty() {
            let rows = outcome
                .failed
                .iter()
                .map(|f| vec![f.item.to_string(), f.reason.clone()])
                .collect();
            println!("{}", pretty_table(&["Transaction", "Reason"], rows));
        }
    }
    Ok(())
}
