// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::LedgerError;
use crate::ledger::projects::{list_projects, sync_transactions};
use crate::ledger::splits::SPLIT_TOLERANCE;
use crate::ledger::store::{get_transaction, splits_for};
use crate::ledger::taxonomy::Taxonomy;
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: &'static str,
    pub detail: String,
}

fn issue(kind: &'static str, detail: String) -> Issue {
    Issue { kind, detail }
}

pub fn handle(conn: &Connection) -> Result<()> {
    let issues = find_issues(conn)?;
    if issues.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        let rows = issues
            .into_iter()
            .map(|i| vec![i.kind.to_string(), i.detail])
            .collect();
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}

pub fn find_issues(conn: &Connection) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    let taxonomy = Taxonomy::load(conn)?;

    // 1) Purpose chains that loop or point at missing parents
    for node in taxonomy.nodes() {
        match taxonomy.resolve_path(node.id) {
            Err(LedgerError::CycleDetected(at)) => issues.push(issue(
                "purpose_cycle",
                format!("purpose {} loops back at {}", node.id, at),
            )),
            Err(err) => issues.push(issue("purpose_broken_parent", format!("purpose {}: {}", node.id, err))),
            Ok(_) => {}
        }
    }

    // 2) Category references to purposes that no longer exist
    let mut stmt = conn.prepare(
        "SELECT 'transaction', id, main_purpose_id, business_purpose_id, specific_purpose_id FROM transactions
         UNION ALL
         SELECT 'split', id, main_purpose_id, business_purpose_id, specific_purpose_id FROM transaction_splits",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let owner: String = r.get(0)?;
        let id: i64 = r.get(1)?;
        for idx in 2..=4 {
            let purpose: Option<i64> = r.get(idx)?;
            if let Some(p) = purpose.filter(|p| taxonomy.get(*p).is_none()) {
                issues.push(issue(
                    "dangling_purpose",
                    format!("{} {} references purpose {}", owner, id, p),
                ));
            }
        }
    }

    // 3) Split parts that no longer add up to their transaction
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.transaction_id, a.transaction_id IS NOT NULL
         FROM transaction_splits s LEFT JOIN split_archives a ON a.transaction_id=s.transaction_id
         ORDER BY s.transaction_id",
    )?;
    let split_txs = stmt
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, bool>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (tx_id, archived) in split_txs {
        let tx = get_transaction(conn, tx_id)?;
        let parts: Decimal = splits_for(conn, tx_id)?.iter().map(|p| p.amount).sum();
        if (parts - tx.total()).abs() > SPLIT_TOLERANCE {
            issues.push(issue(
                "split_not_conserved",
                format!("transaction {}: parts {} vs total {}", tx_id, parts, tx.total()),
            ));
        }
        if !archived {
            issues.push(issue(
                "split_without_archive",
                format!("transaction {} cannot be restored", tx_id),
            ));
        }
    }

    // 4) Projects referenced by name instead of id
    for project in list_projects(conn)? {
        let summary = sync_transactions(conn, project.id)?;
        if summary.matched_by_name > 0 {
            issues.push(issue(
                "project_name_reference",
                format!(
                    "{} transaction(s) name project '{}' instead of id {}",
                    summary.matched_by_name, project.name, project.id
                ),
            ));
        }
    }

    Ok(issues)
}
