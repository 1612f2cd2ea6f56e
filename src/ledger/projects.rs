// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Per-project ledgers and verification snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::budgets::Utilization;
use super::store::transactions_with_project;
use super::{with_snapshot, with_write};
use crate::errors::{LedgerError, Result};
use crate::models::{ProjectAccount, ProjectStatus, Transaction};
use crate::permissions::{Capabilities, Operation, ensure};
use crate::utils::money;

pub fn create_project(
    conn: &Connection,
    caps: &dyn Capabilities,
    name: &str,
    budget: Decimal,
) -> Result<ProjectAccount> {
    ensure(caps, Operation::ManageProjects)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("project name is required"));
    }
    if name.parse::<i64>().is_ok() {
        // a numeric name would be indistinguishable from a project id
        return Err(LedgerError::validation("project name cannot be a bare number"));
    }
    if budget < Decimal::ZERO {
        return Err(LedgerError::validation("project budget cannot be negative"));
    }
    conn.execute(
        "INSERT INTO project_accounts(name, budget) VALUES (?1, ?2)",
        params![name, money(budget).to_string()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(project_id = id, name, "project created");
    get_project(conn, id)
}

pub fn get_project(conn: &Connection, id: i64) -> Result<ProjectAccount> {
    conn.query_row(
        &format!("SELECT {} FROM project_accounts WHERE id=?1", ProjectAccount::COLUMNS),
        params![id],
        ProjectAccount::from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("project", id))
}

pub fn list_projects(conn: &Connection) -> Result<Vec<ProjectAccount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM project_accounts ORDER BY name",
        ProjectAccount::COLUMNS
    ))?;
    let rows = stmt.query_map([], ProjectAccount::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn set_project_status(
    conn: &Connection,
    caps: &dyn Capabilities,
    id: i64,
    status: ProjectStatus,
) -> Result<()> {
    ensure(caps, Operation::ManageProjects)?;
    let n = conn.execute(
        "UPDATE project_accounts SET status=?1 WHERE id=?2",
        params![status.as_str(), id],
    )?;
    if n == 0 {
        return Err(LedgerError::not_found("project", id));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectMatch {
    ById,
    ByName,
}

/// How a transaction's project field refers to `project`, if at all. Older
/// records carry the display name instead of the id.
pub fn project_match(project: &ProjectAccount, t: &Transaction) -> Option<ProjectMatch> {
    let key = t.project_account.as_deref()?.trim();
    if key == project.id.to_string() {
        Some(ProjectMatch::ById)
    } else if key == project.name {
        Some(ProjectMatch::ByName)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFinanceSummary {
    pub project_id: i64,
    pub project_name: String,
    pub budget: Decimal,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_income: Decimal,
    pub utilization_percent: Decimal,
    pub transaction_count: usize,
    pub matched_by_name: usize,
}

impl ProjectFinanceSummary {
    pub fn utilization(&self) -> Utilization {
        Utilization::of(self.total_expense, self.budget)
    }
}

/// Aggregates the transactions that belong to `project`. Others are ignored.
pub fn summarize_project(
    project: &ProjectAccount,
    transactions: &[Transaction],
) -> ProjectFinanceSummary {
    let mut total_income = Decimal::ZERO;
    let mut total_expense = Decimal::ZERO;
    let mut count = 0;
    let mut by_name = 0;
    for t in transactions {
        match project_match(project, t) {
            None => continue,
            Some(ProjectMatch::ByName) => by_name += 1,
            Some(ProjectMatch::ById) => {}
        }
        count += 1;
        total_income += t.income;
        total_expense += t.expense;
    }
    ProjectFinanceSummary {
        project_id: project.id,
        project_name: project.name.clone(),
        budget: project.budget,
        total_income,
        total_expense,
        net_income: total_income - total_expense,
        utilization_percent: Utilization::of(total_expense, project.budget).percent,
        transaction_count: count,
        matched_by_name: by_name,
    }
}

/// Project transactions matched by id or by name, each once, oldest first.
fn project_transactions(conn: &Connection, project: &ProjectAccount) -> Result<Vec<Transaction>> {
    let mut merged: BTreeMap<i64, Transaction> = BTreeMap::new();
    for key in [project.id.to_string(), project.name.clone()] {
        for t in transactions_with_project(conn, &key)? {
            merged.insert(t.id, t);
        }
    }
    let mut txs: Vec<Transaction> = merged.into_values().collect();
    txs.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
    Ok(txs)
}

pub fn sync_transactions(conn: &Connection, project_id: i64) -> Result<ProjectFinanceSummary> {
    with_snapshot(conn, |db| {
        let project = get_project(db, project_id)?;
        let txs = project_transactions(db, &project)?;
        let summary = summarize_project(&project, &txs);
        if summary.matched_by_name > 0 {
            tracing::warn!(
                project_id,
                matched_by_name = summary.matched_by_name,
                "transactions reference the project by name instead of id"
            );
        }
        Ok(summary)
    })
}

/// Point-in-time aggregate handed to the approval workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    pub request_id: i64,
    pub project: ProjectAccount,
    pub summary: ProjectFinanceSummary,
    pub transaction_ids: Vec<i64>,
    pub requested_at: DateTime<Utc>,
}

impl VerificationSnapshot {
    /// Totals agree with each other and with the transactions listed.
    pub fn is_consistent(&self) -> bool {
        self.summary.net_income == self.summary.total_income - self.summary.total_expense
            && self.summary.transaction_count == self.transaction_ids.len()
            && self.summary.project_id == self.project.id
    }
}

/// Receives verification snapshots. Acting on them happens elsewhere and
/// need not be synchronous.
pub trait ApprovalWorkflow {
    fn submit(&self, snapshot: &VerificationSnapshot) -> std::result::Result<(), String>;
}

/// Leaves the request in the pending queue for reviewers to pick up.
pub struct QueuedApproval;

impl ApprovalWorkflow for QueuedApproval {
    fn submit(&self, snapshot: &VerificationSnapshot) -> std::result::Result<(), String> {
        tracing::info!(
            request_id = snapshot.request_id,
            project_id = snapshot.project.id,
            "verification request queued"
        );
        Ok(())
    }
}

/// Records a snapshot of the project's figures and submits it. When the
/// workflow rejects the submission the recorded request is rolled back.
pub fn request_verification(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    project_id: i64,
    workflow: &dyn ApprovalWorkflow,
) -> Result<VerificationSnapshot> {
    ensure(caps, Operation::RequestVerification)?;
    with_write(conn, |db| {
        let project = get_project(db, project_id)?;
        let txs = project_transactions(db, &project)?;
        let summary = summarize_project(&project, &txs);
        let requested_at = Utc::now();
        db.execute(
            "INSERT INTO verification_requests(project_id, snapshot, status, requested_at) VALUES (?1, '{}', 'pending', ?2)",
            params![project_id, requested_at.to_rfc3339()],
        )?;
        let snapshot = VerificationSnapshot {
            request_id: db.last_insert_rowid(),
            transaction_ids: txs.iter().map(|t| t.id).collect(),
            project,
            summary,
            requested_at,
        };
        db.execute(
            "UPDATE verification_requests SET snapshot=?1 WHERE id=?2",
            params![serde_json::to_string(&snapshot)?, snapshot.request_id],
        )?;
        workflow
            .submit(&snapshot)
            .map_err(LedgerError::ExternalService)?;
        Ok(snapshot)
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationRequest {
    pub id: i64,
    pub project_id: i64,
    pub status: String,
    pub requested_at: String,
    pub snapshot: VerificationSnapshot,
}

pub fn list_verification_requests(
    conn: &Connection,
    project_id: i64,
) -> Result<Vec<VerificationRequest>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, status, requested_at, snapshot FROM verification_requests WHERE project_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![project_id], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, project_id, status, requested_at, raw) = row?;
        out.push(VerificationRequest {
            id,
            project_id,
            status,
            requested_at,
            snapshot: serde_json::from_str(&raw)?,
        });
    }
    Ok(out)
}
