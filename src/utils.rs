// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use std::sync::Once;

use crate::permissions::{AllowAll, Capabilities, ReadOnly};

pub const DEFAULT_CURRENCY_LABEL: &str = "RM";

static TRACING_INIT: Once = Once::new();

/// Installs the fmt subscriber once; `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("chapterledger=warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_month(s: &str) -> Result<String> {
    let s = s.trim();
    chrono::NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}', expected YYYY-MM", s))?;
    Ok(s.to_string())
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

/// Accepts `YYYY`, `YYYY-MM` or `YYYY-MM-DD..YYYY-MM-DD` and returns an
/// inclusive date range.
pub fn parse_period(s: &str) -> Result<(NaiveDate, NaiveDate)> {
    let s = s.trim();
    if let Some((from, to)) = s.split_once("..") {
        let from = parse_date(from)?;
        let to = parse_date(to)?;
        if to < from {
            return Err(anyhow::anyhow!("Period '{}' ends before it starts", s));
        }
        return Ok((from, to));
    }
    if s.len() == 4 {
        let y: i32 = s
            .parse()
            .with_context(|| format!("Invalid year '{}'", s))?;
        let from = NaiveDate::from_ymd_opt(y, 1, 1)
            .ok_or_else(|| anyhow::anyhow!("Invalid year '{}'", s))?;
        let to = NaiveDate::from_ymd_opt(y, 12, 31)
            .ok_or_else(|| anyhow::anyhow!("Invalid year '{}'", s))?;
        return Ok((from, to));
    }
    let month = parse_month(s)?;
    let from = parse_date(&format!("{}-01", month))?;
    Ok((from, month_end(&month)?))
}

pub fn month_end(month: &str) -> Result<NaiveDate> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}'", month))?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
        .ok_or_else(|| anyhow::anyhow!("Invalid month '{}'", month))
}

/// Rounds to cents, the precision amounts are stored at.
pub fn money(d: Decimal) -> Decimal {
    d.round_dp(2)
}

pub fn fmt_money(d: &Decimal, label: &str) -> String {
    format!("{} {:.2}", label, d.round_dp(2))
}

pub(crate) fn get_decimal(r: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = r.get(idx)?;
    s.trim().parse::<Decimal>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        // If v is an array, stream each element; else stream single line
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

/// Value of an argument clap already enforces as required or defaulted.
pub fn required<'a, T>(m: &'a clap::ArgMatches, id: &str) -> Result<&'a T>
where
    T: std::any::Any + Clone + Send + Sync + 'static,
{
    m.get_one::<T>(id)
        .with_context(|| format!("Missing argument '{}'", id))
}

pub fn id_for_account(conn: &Connection, name: &str) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT id FROM bank_accounts WHERE account_name=?1")?;
    let id: i64 = stmt
        .query_row(params![name.trim()], |r| r.get(0))
        .with_context(|| format!("Account '{}' not found", name))?;
    Ok(id)
}

pub fn id_for_project(conn: &Connection, name: &str) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT id FROM project_accounts WHERE name=?1")?;
    let id: i64 = stmt
        .query_row(params![name.trim()], |r| r.get(0))
        .with_context(|| format!("Project '{}' not found", name))?;
    Ok(id)
}

/// Accepts either a numeric id or an account name.
pub fn resolve_account(conn: &Connection, raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(id) => Ok(id),
        Err(_) => id_for_account(conn, raw),
    }
}

/// Accepts either a numeric id or a project name.
pub fn resolve_project(conn: &Connection, raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(id) => Ok(id),
        Err(_) => id_for_project(conn, raw),
    }
}

pub const SETTING_KEYS: &[&str] = &["currency_label", "read_only"];

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key=?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    if !SETTING_KEYS.contains(&key) {
        return Err(anyhow::anyhow!(
            "Unknown setting '{}' (known: {})",
            key,
            SETTING_KEYS.join(", ")
        ));
    }
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value.trim()],
    )?;
    Ok(())
}

pub fn currency_label(conn: &Connection) -> Result<String> {
    Ok(get_setting(conn, "currency_label")?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY_LABEL.to_string()))
}

/// Capabilities for the CLI session: everything, unless `read_only` is set.
pub fn session_capabilities(conn: &Connection) -> Result<Box<dyn Capabilities>> {
    let read_only = get_setting(conn, "read_only")?
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
    if read_only {
        Ok(Box::new(ReadOnly))
    } else {
        Ok(Box::new(AllowAll))
    }
}
