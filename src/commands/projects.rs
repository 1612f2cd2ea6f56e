// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::projects::{
    ProjectFinanceSummary, QueuedApproval, create_project, list_projects,
    list_verification_requests, request_verification, set_project_status, sync_transactions,
};
use crate::models::ProjectStatus;
use crate::permissions::Capabilities;
use crate::utils::{
    currency_label, fmt_money, maybe_print_json, parse_decimal, pretty_table, required,
    resolve_project,
};
use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn handle(conn: &mut Connection, caps: &dyn Capabilities, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = required::<String>(sub, "name")?;
            let budget = parse_decimal(required::<String>(sub, "budget")?)?;
            let p = create_project(conn, caps, name, budget)?;
            println!("Added project {} '{}'", p.id, p.name);
        }
        Some(("list", sub)) => {
            let projects = list_projects(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &projects)? {
                let label = currency_label(conn)?;
                let rows = projects
                    .iter()
                    .map(|p| {
                        vec![
                            p.id.to_string(),
                            p.name.clone(),
                            fmt_money(&p.budget, &label),
                            p.status.as_str().to_string(),
                        ]
                    })
                    .collect();
                println!("{}", pretty_table(&["Id", "Name", "Budget", "Status"], rows));
            }
        }
        Some(("set-status", sub)) => {
            let id = resolve_project(conn, required::<String>(sub, "project")?)?;
            let raw = required::<String>(sub, "status")?;
            let status = ProjectStatus::parse(raw)
                .with_context(|| format!("Unknown project status '{}'", raw))?;
            set_project_status(conn, caps, id, status)?;
            println!("Project {} is now {}", id, status.as_str());
        }
        Some(("sync", sub)) => {
            let id = resolve_project(conn, required::<String>(sub, "project")?)?;
            let summary = sync_transactions(conn, id)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &summary)? {
                print_summary(conn, &summary)?;
            }
        }
        Some(("verify", sub)) => {
            let id = resolve_project(conn, required::<String>(sub, "project")?)?;
            let snapshot = request_verification(conn, caps, id, &QueuedApproval)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &snapshot)? {
                println!(
                    "Verification request {} submitted for '{}' ({} transactions)",
                    snapshot.request_id,
                    snapshot.project.name,
                    snapshot.transaction_ids.len()
                );
                print_summary(conn, &snapshot.summary)?;
            }
        }
        Some(("requests", sub)) => {
            let id = resolve_project(conn, required::<String>(sub, "project")?)?;
            let requests = list_verification_requests(conn, id)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &requests)? {
                let rows = requests
                    .iter()
                    .map(|r| {
                        vec![
                            r.id.to_string(),
                            r.requested_at.clone(),
                            r.status.clone(),
                            r.snapshot.summary.net_income.to_string(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["Request", "Requested", "Status", "Net"], rows)
                );
            }
        }
        _ => {}
    }
    Ok(())
}

fn print_summary(conn: &Connection, s: &ProjectFinanceSummary) -> Result<()> {
    let label = currency_label(conn)?;
    let utilization = s.utilization();
    let rows = vec![
        vec!["Income".into(), fmt_money(&s.total_income, &label)],
        vec!["Expense".into(), fmt_money(&s.total_expense, &label)],
        vec!["Net".into(), fmt_money(&s.net_income, &label)],
        vec!["Budget".into(), fmt_money(&s.budget, &label)],
        vec![
            "Utilization".into(),
            format!("{}% ({})", utilization.percent, utilization.band.as_str()),
        ],
        vec!["Transactions".into(), s.transaction_count.to_string()],
    ];
    println!("{}", pretty_table(&[s.project_name.as_str(), ""], rows));
    if s.matched_by_name > 0 {
        println!(
            "note: {} transaction(s) reference this project by name",
            s.matched_by_name
        );
    }
    Ok(())
}
