// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::balances::compute_running_balances;
use crate::utils::{
    currency_label, fmt_money, maybe_print_json, parse_date, pretty_table, required,
    resolve_account,
};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => show(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let account_id = resolve_account(conn, required::<String>(sub, "account")?)?;
    let balances = compute_running_balances(conn, account_id)?;
    let label = currency_label(conn)?;
    let (json_flag, jsonl_flag) = (sub.get_flag("json"), sub.get_flag("jsonl"));

    if let Some(raw) = sub.get_one::<String>("as-of") {
        let date = parse_date(raw)?;
        let balance = balances.as_of(date);
        if !maybe_print_json(
            json_flag,
            jsonl_flag,
            &serde_json::json!({ "account_id": account_id, "as_of": date, "balance": balance }),
        )? {
            println!("Balance at end of {}: {}", date, fmt_money(&balance, &label));
        }
        return Ok(());
    }

    if !maybe_print_json(json_flag, jsonl_flag, &balances)? {
        let mut rows = vec![vec![
            String::new(),
            "opening".into(),
            String::new(),
            String::new(),
            fmt_money(&balances.opening, &label),
        ]];
        rows.extend(balances.lines.iter().map(|l| {
            vec![
                l.transaction_id.to_string(),
                l.date.to_string(),
                l.income.to_string(),
                l.expense.to_string(),
                fmt_money(&l.balance, &label),
            ]
        }));
        println!(
            "{}",
            pretty_table(&["Tx", "Date", "Income", "Expense", "Balance"], rows)
        );
    }
    Ok(())
}
