// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::splits::{
    PurposeSelection, SplitCommand, SplitLine, SplitState, apply_split, remove_split,
    split_progress, split_state, validate_split,
};
use crate::ledger::store::get_transaction;
use crate::ledger::taxonomy::Taxonomy;
use crate::models::TransactionSplit;
use crate::permissions::Capabilities;
use crate::utils::{maybe_print_json, parse_decimal, pretty_table, required};
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use serde::Serialize;

pub fn handle(conn: &mut Connection, caps: &dyn Capabilities, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("apply", sub)) => apply(conn, caps, sub)?,
        Some(("preview", sub)) => preview(conn, sub)?,
        Some(("remove", sub)) => {
            let id = *required::<i64>(sub, "tx")?;
            let tx = remove_split(conn, caps, id)?;
            let path = Taxonomy::load(conn)?.display_path(tx.category.deepest());
            println!("Removed split of transaction {}; purpose restored to {}", id, path);
        }
        Some(("show", sub)) => show(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .with_context(|| format!("Invalid purpose id '{}'", raw))
}

/// Parses `AMOUNT=PURPOSE[:DESCRIPTION]`. A single id selects the purpose
/// directly; `MAIN/BUSINESS[/SPECIFIC]` walks the cascade.
pub fn parse_part(raw: &str) -> Result<SplitLine> {
    let (amount, rest) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Split part '{}' must look like AMOUNT=PURPOSE", raw))?;
    let amount = parse_decimal(amount)?;
    let (purpose, description) = match rest.split_once(':') {
        Some((p, d)) => (p, Some(d.trim()).filter(|d| !d.is_empty())),
        None => (rest, None),
    };

    let mut selection = PurposeSelection::default();
    let ids: Vec<&str> = purpose.split('/').collect();
    match ids.as_slice() {
        [single] => selection.choose_fallback(parse_id(single)?),
        [main, rest @ ..] if rest.len() <= 2 => {
            selection.choose_main(parse_id(main)?);
            if let Some(business) = rest.first() {
                selection.choose_business(parse_id(business)?);
            }
            if let Some(specific) = rest.get(1) {
                selection.choose_specific(parse_id(specific)?);
            }
        }
        _ => return Err(anyhow!("Purpose '{}' has more than three levels", purpose)),
    }

    let line = SplitLine::new(amount, selection);
    Ok(match description {
        Some(d) => line.with_description(d),
        None => line,
    })
}

fn parts_from_args(sub: &clap::ArgMatches) -> Result<Vec<SplitLine>> {
    sub.get_many::<String>("part")
        .map(|parts| parts.map(|p| parse_part(p)).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn apply(conn: &mut Connection, caps: &dyn Capabilities, sub: &clap::ArgMatches) -> Result<()> {
    let id = *required::<i64>(sub, "tx")?;
    let mut cmd = SplitCommand::new(id, parts_from_args(sub)?);
    cmd.expected_version = sub.get_one::<i64>("expect-version").copied();
    let parts = apply_split(conn, caps, &cmd)?;
    println!("Split transaction {} into {} parts", id, parts.len());
    let taxonomy = Taxonomy::load(conn)?;
    println!("{}", parts_table(&parts, &taxonomy));
    Ok(())
}

#[derive(Serialize)]
struct Preview {
    expected: String,
    allocated: String,
    remaining: String,
    balanced: bool,
    error: Option<String>,
}

fn preview(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *required::<i64>(sub, "tx")?;
    let lines = parts_from_args(sub)?;
    let tx = get_transaction(conn, id)?;
    let taxonomy = Taxonomy::load(conn)?;
    let progress = split_progress(&tx, &lines);
    let error = validate_split(&tx, &lines, &taxonomy)
        .err()
        .map(|e| e.to_string());
    let out = Preview {
        expected: progress.expected.to_string(),
        allocated: progress.allocated.to_string(),
        remaining: progress.remaining.to_string(),
        balanced: progress.balanced,
        error,
    };
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &out)? {
        println!(
            "{}",
            pretty_table(
                &["Total", "Allocated", "Remaining", "Status"],
                vec![vec![
                    out.expected.clone(),
                    out.allocated.clone(),
                    out.remaining.clone(),
                    out.error.clone().unwrap_or_else(|| "ok".into()),
                ]],
            )
        );
    }
    Ok(())
}

fn parts_table(parts: &[TransactionSplit], taxonomy: &Taxonomy) -> comfy_table::Table {
    let rows = parts
        .iter()
        .map(|p| {
            vec![
                p.split_index.to_string(),
                p.amount.to_string(),
                taxonomy.display_path(p.category.deepest()),
                p.description.clone().unwrap_or_default(),
            ]
        })
        .collect();
    pretty_table(&["#", "Amount", "Purpose", "Description"], rows)
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *required::<i64>(sub, "tx")?;
    let parts = match split_state(conn, id)? {
        SplitState::Unsplit => Vec::new(),
        SplitState::Split(parts) => parts,
    };
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &parts)? {
        return Ok(());
    }
    if parts.is_empty() {
        println!("Transaction {} is not split", id);
    } else {
        println!("{}", parts_table(&parts, &Taxonomy::load(conn)?));
    }
    Ok(())
}
