// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::reports::{FinancialReport, Period, financial_report};
use crate::utils::{currency_label, fmt_money, maybe_print_json, parse_period, pretty_table, required};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("summary", sub)) => summary(conn, sub)?,
        _ => {}
    }
    Ok(())
}

/// Builds the report named by `--period` and `--budget`.
pub fn report_from_args(conn: &Connection, sub: &clap::ArgMatches) -> Result<FinancialReport> {
    let (from, to) = parse_period(required::<String>(sub, "period")?)?;
    let period = Period::new(from, to)?;
    Ok(financial_report(
        conn,
        period,
        sub.get_one::<i64>("budget").copied(),
    )?)
}

fn summary(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let report = report_from_args(conn, sub)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &report)? {
        return Ok(());
    }
    let label = currency_label(conn)?;
    println!(
        "{}",
        pretty_table(
            &["Period", "Transactions", "Income", "Expense", "Net"],
            vec![vec![
                format!("{} .. {}", report.period.from, report.period.to),
                report.transaction_count.to_string(),
                fmt_money(&report.total_income, &label),
                fmt_money(&report.total_expense, &label),
                fmt_money(&report.net_income, &label),
            ]],
        )
    );

    if !report.variances.is_empty() {
        let rows = report
            .variances
            .iter()
            .map(|v| {
                vec![
                    v.purpose_path.clone(),
                    fmt_money(&v.budgeted, &label),
                    fmt_money(&v.actual, &label),
                    fmt_money(&v.variance, &label),
                    format!("{}%", v.variance_percentage),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Purpose", "Budgeted", "Actual", "Variance", "Variance %"],
                rows
            )
        );
    }

    if !report.spend_by_purpose.is_empty() {
        let rows = report
            .spend_by_purpose
            .iter()
            .map(|s| vec![s.purpose_path.clone(), fmt_money(&s.expense, &label)])
            .collect();
        println!("{}", pretty_table(&["Purpose", "Spent"], rows));
    }
    Ok(())
}
