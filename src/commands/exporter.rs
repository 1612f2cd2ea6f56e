// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::reports::report_from_args;
use crate::ledger::store::{TransactionFilter, list_accounts, list_transactions, splits_by_transaction};
use crate::ledger::taxonomy::Taxonomy;
use crate::utils::required;
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => export_transactions(conn, sub),
        Some(("report", sub)) => export_report(conn, sub),
        _ => Ok(()),
    }
}

fn export_format(sub: &clap::ArgMatches) -> Result<String> {
    let fmt = required::<String>(sub, "format")?.to_lowercase();
    match fmt.as_str() {
        "csv" | "json" => Ok(fmt),
        _ => Err(anyhow!("Unknown format: {} (use csv|json)", fmt)),
    }
}

/// Writes every transaction, oldest first. In CSV a split transaction is
/// followed by one row per part; in JSON the parts are nested.
fn export_transactions(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = export_format(sub)?;
    let out = required::<String>(sub, "out")?;

    let mut txs = list_transactions(conn, &TransactionFilter::default())?;
    txs.reverse();
    let taxonomy = Taxonomy::load(conn)?;
    let accounts: HashMap<i64, String> = list_accounts(conn)?
        .into_iter()
        .map(|a| (a.id, a.account_name))
        .collect();
    let ids: Vec<i64> = txs.iter().map(|t| t.id).collect();
    let splits = splits_by_transaction(conn, &ids)?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "id",
                "date",
                "account",
                "main_description",
                "sub_description",
                "income",
                "expense",
                "payer_payee",
                "purpose",
                "project_account",
                "audit_year",
                "reference_no",
                "split_index",
                "split_amount",
                "split_purpose",
                "split_description",
            ])?;
            for t in &txs {
                let account = accounts.get(&t.bank_account_id).cloned().unwrap_or_default();
                let parts = splits.get(&t.id).map(Vec::as_slice).unwrap_or(&[]);
                let purpose = if parts.is_empty() {
                    taxonomy.display_path(t.category.deepest())
                } else {
                    String::new()
                };
                wtr.write_record([
                    t.id.to_string(),
                    t.date.to_string(),
                    account.clone(),
                    t.main_description.clone(),
                    t.sub_description.clone().unwrap_or_default(),
                    t.income.to_string(),
                    t.expense.to_string(),
                    t.payer_payee.clone().unwrap_or_default(),
                    purpose,
                    t.project_account.clone().unwrap_or_default(),
                    t.audit_year.to_string(),
                    t.reference_no.clone().unwrap_or_default(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                ])?;
                for p in parts {
                    let mut record = vec![String::new(); 12];
                    record[0] = t.id.to_string();
                    record[1] = t.date.to_string();
                    record[2] = account.clone();
                    record.extend([
                        p.split_index.to_string(),
                        p.amount.to_string(),
                        taxonomy.display_path(p.category.deepest()),
                        p.description.clone().unwrap_or_default(),
                    ]);
                    wtr.write_record(&record)?;
                }
            }
            wtr.flush()?;
        }
        _ => {
            let items: Vec<serde_json::Value> = txs
                .iter()
                .map(|t| {
                    let parts: Vec<serde_json::Value> = splits
                        .get(&t.id)
                        .map(|ps| {
                            ps.iter()
                                .map(|p| {
                                    json!({
                                        "split_index": p.split_index,
                                        "amount": p.amount,
                                        "purpose": taxonomy.display_path(p.category.deepest()),
                                        "description": p.description,
                                    })
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    let purpose = if parts.is_empty() {
                        Some(taxonomy.display_path(t.category.deepest()))
                    } else {
                        None
                    };
                    json!({
                        "id": t.id,
                        "date": t.date,
                        "account": accounts.get(&t.bank_account_id),
                        "main_description": t.main_description,
                        "sub_description": t.sub_description,
                        "income": t.income,
                        "expense": t.expense,
                        "payer_payee": t.payer_payee,
                        "purpose": purpose,
                        "project_account": t.project_account,
                        "audit_year": t.audit_year,
                        "reference_no": t.reference_no,
                        "splits": parts,
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
    }
    println!("Exported {} transactions to {}", txs.len(), out);
    Ok(())
}

fn export_report(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = export_format(sub)?;
    let out = required::<String>(sub, "out")?;
    let report = report_from_args(conn, sub)?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record(["purpose", "budgeted", "actual", "variance", "variance_percentage"])?;
            for v in &report.variances {
                wtr.write_record([
                    v.purpose_path.clone(),
                    v.budgeted.to_string(),
                    v.actual.to_string(),
                    v.variance.to_string(),
                    v.variance_percentage.to_string(),
                ])?;
            }
            for (label, amount) in [
                ("(total income)", report.total_income),
                ("(total expense)", report.total_expense),
                ("(net income)", report.net_income),
            ] {
                wtr.write_record([
                    label.to_string(),
                    String::new(),
                    amount.to_string(),
                    String::new(),
                    String::new(),
                ])?;
            }
            wtr.flush()?;
        }
        _ => {
            std::fs::write(out, serde_json::to_string_pretty(&report)?)?;
        }
    }
    println!(
        "Exported report for {} .. {} to {}",
        report.period.from, report.period.to, out
    );
    Ok(())
}
