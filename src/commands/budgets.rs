// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::budgets::{
    allocate, budget_status, create_budget, delete_budget, list_budgets, refresh_budget,
    set_budget_status, set_budget_total, unallocate,
};
use crate::ledger::taxonomy::Taxonomy;
use crate::models::BudgetStatus;
use crate::permissions::Capabilities;
use crate::utils::{
    currency_label, fmt_money, maybe_print_json, parse_decimal, pretty_table, required,
};
use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn handle(conn: &mut Connection, caps: &dyn Capabilities, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => {
            let project = required::<String>(sub, "project")?;
            let year = *required::<i32>(sub, "year")?;
            let total = parse_decimal(required::<String>(sub, "total")?)?;
            let budget = create_budget(conn, caps, project, year, total)?;
            println!(
                "Created budget {} for '{}' {} ({})",
                budget.id,
                budget.project_name,
                budget.budget_year,
                fmt_money(&budget.total_budget, &currency_label(conn)?)
            );
        }
        Some(("allocate", sub)) => {
            let budget_id = *required::<i64>(sub, "budget")?;
            let purpose_id = *required::<i64>(sub, "purpose")?;
            let amount = parse_decimal(required::<String>(sub, "amount")?)?;
            let a = allocate(conn, caps, budget_id, purpose_id, amount)?;
            let path = Taxonomy::load(conn)?.display_path(Some(purpose_id));
            println!(
                "Allocated {} to {} (spent {}, remaining {})",
                a.allocated_amount, path, a.spent_amount, a.remaining_amount
            );
        }
        Some(("unallocate", sub)) => {
            let budget_id = *required::<i64>(sub, "budget")?;
            let purpose_id = *required::<i64>(sub, "purpose")?;
            let b = unallocate(conn, caps, budget_id, purpose_id)?;
            println!(
                "Removed allocation; budget {} now has {} allocated",
                b.id, b.allocated_amount
            );
        }
        Some(("set-total", sub)) => {
            let budget_id = *required::<i64>(sub, "budget")?;
            let total = parse_decimal(required::<String>(sub, "total")?)?;
            let b = set_budget_total(conn, caps, budget_id, total)?;
            println!(
                "Budget {} total is now {} (remaining {})",
                b.id, b.total_budget, b.remaining_amount
            );
        }
        Some(("set-status", sub)) => {
            let budget_id = *required::<i64>(sub, "budget")?;
            let raw = required::<String>(sub, "status")?;
            let status = BudgetStatus::parse(raw)
                .with_context(|| format!("Unknown budget status '{}'", raw))?;
            set_budget_status(conn, caps, budget_id, status)?;
            println!("Budget {} is now {}", budget_id, status.as_str());
        }
        Some(("status", sub)) => status(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("refresh", sub)) => {
            let budget_id = *required::<i64>(sub, "budget")?;
            let b = refresh_budget(conn, budget_id)?;
            println!(
                "Budget {}: spent {}, remaining {}",
                b.id, b.spent_amount, b.remaining_amount
            );
        }
        Some(("rm", sub)) => {
            let budget_id = *required::<i64>(sub, "budget")?;
            delete_budget(conn, caps, budget_id)?;
            println!("Deleted budget {}", budget_id);
        }
        _ => {}
    }
    Ok(())
}

fn status(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let budget_id = *required::<i64>(sub, "budget")?;
    let view = budget_status(conn, budget_id)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &view)? {
        return Ok(());
    }
    let label = currency_label(conn)?;
    let b = &view.budget;
    println!(
        "{} {} [{}]: total {}, allocated {}, spent {}, remaining {} ({}%, {})",
        b.project_name,
        b.budget_year,
        b.status.as_str(),
        fmt_money(&b.total_budget, &label),
        fmt_money(&b.allocated_amount, &label),
        fmt_money(&b.spent_amount, &label),
        fmt_money(&b.remaining_amount, &label),
        view.utilization.percent,
        view.utilization.band.as_str()
    );
    let rows = view
        .allocations
        .iter()
        .map(|a| {
            vec![
                a.purpose_path.clone(),
                fmt_money(&a.allocated_amount, &label),
                fmt_money(&a.spent_amount, &label),
                fmt_money(&a.remaining_amount, &label),
                format!("{}%", a.utilization.percent),
                a.utilization.band.as_str().to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Purpose", "Allocated", "Spent", "Remaining", "Used", "Band"],
            rows
        )
    );
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let budgets = list_budgets(conn, sub.get_one::<i32>("year").copied())?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &budgets)? {
        let label = currency_label(conn)?;
        let rows = budgets
            .iter()
            .map(|b| {
                vec![
                    b.id.to_string(),
                    b.project_name.clone(),
                    b.budget_year.to_string(),
                    b.status.as_str().to_string(),
                    fmt_money(&b.total_budget, &label),
                    fmt_money(&b.spent_amount, &label),
                    fmt_money(&b.remaining_amount, &label),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Id", "Project", "Year", "Status", "Total", "Spent", "Remaining"],
                rows
            )
        );
    }
    Ok(())
}
