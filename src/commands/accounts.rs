// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::balances::account_balances;
use crate::ledger::store::{create_account, delete_account, list_accounts};
use crate::permissions::Capabilities;
use crate::utils::{
    currency_label, fmt_money, maybe_print_json, parse_decimal, pretty_table, required,
    resolve_account,
};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, caps: &dyn Capabilities, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = required::<String>(sub, "name")?;
            let typ = required::<String>(sub, "type")?;
            let initial = parse_decimal(required::<String>(sub, "initial")?)?;
            let account = create_account(conn, caps, name, typ, initial)?;
            println!(
                "Added account '{}' ({}, opening {})",
                account.account_name,
                account.account_type,
                fmt_money(&account.initial_amount, &currency_label(conn)?)
            );
        }
        Some(("list", sub)) => {
            let accounts = list_accounts(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &accounts)? {
                let label = currency_label(conn)?;
                let data = accounts
                    .iter()
                    .map(|a| {
                        vec![
                            a.id.to_string(),
                            a.account_name.clone(),
                            a.account_type.clone(),
                            fmt_money(&a.initial_amount, &label),
                        ]
                    })
                    .collect();
                println!("{}", pretty_table(&["Id", "Name", "Type", "Opening"], data));
            }
        }
        Some(("rm", sub)) => {
            let raw = required::<String>(sub, "account")?;
            let id = resolve_account(conn, raw)?;
            delete_account(conn, caps, id)?;
            println!("Removed account '{}'", raw.trim());
        }
        Some(("balances", sub)) => {
            let balances = account_balances(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &balances)? {
                let label = currency_label(conn)?;
                let data = balances
                    .iter()
                    .map(|b| {
                        vec![
                            b.account_name.clone(),
                            b.account_type.clone(),
                            fmt_money(&b.opening, &label),
                            b.transaction_count.to_string(),
                            fmt_money(&b.closing, &label),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Account", "Type", "Opening", "Transactions", "Balance"],
                        data
                    )
                );
            }
        }
        _ => {}
    }
    Ok(())
}
