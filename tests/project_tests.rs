// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chapterledger::db;
use chapterledger::errors::LedgerError;
use chapterledger::ledger::budgets::UtilizationBand;
use chapterledger::ledger::projects::{
    ApprovalWorkflow, ProjectMatch, QueuedApproval, VerificationSnapshot, create_project,
    get_project, list_verification_requests, project_match, request_verification,
    set_project_status, sync_transactions,
};
use chapterledger::ledger::store::{
    TransactionDraft, TransactionFilter, create_account, create_transaction, list_transactions,
};
use chapterledger::models::ProjectStatus;
use chapterledger::permissions::{AllowAll, ReadOnly};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn setup() -> (Connection, i64, i64) {
    let mut conn = db::open_in_memory().unwrap();
    let account = create_account(&conn, &AllowAll, "Current", "current", d("0"))
        .unwrap()
        .id;
    let project = create_project(&conn, &AllowAll, "Food Drive", d("400"))
        .unwrap()
        .id;
    let key = project.to_string();
    for (date, income, expense, proj) in [
        ("2024-02-01", "0", "120", key.as_str()),
        ("2024-02-03", "50", "0", key.as_str()),
        // legacy entry carrying the display name
        ("2024-02-05", "0", "80", "Food Drive"),
        ("2024-02-06", "0", "999", "Book Fair"),
    ] {
        create_transaction(
            &mut conn,
            &AllowAll,
            TransactionDraft::new(account, day(date), "project entry")
                .income(d(income))
                .expense(d(expense))
                .project(proj),
        )
        .unwrap();
    }
    (conn, account, project)
}

struct Rejecting;

impl ApprovalWorkflow for Rejecting {
    fn submit(&self, _snapshot: &VerificationSnapshot) -> Result<(), String> {
        Err("approval service unavailable".into())
    }
}

#[test]
fn sync_matches_by_id_and_by_name() {
    let (conn, _, project) = setup();
    let summary = sync_transactions(&conn, project).unwrap();
    assert_eq!(summary.transaction_count, 3);
    assert_eq!(summary.matched_by_name, 1);
    assert_eq!(summary.total_income, d("50"));
    assert_eq!(summary.total_expense, d("200"));
    assert_eq!(summary.net_income, d("-150"));
    assert_eq!(summary.utilization_percent, d("50"));
    assert_eq!(summary.utilization().band, UtilizationBand::Normal);
}

#[test]
fn project_match_distinguishes_reference_kinds() {
    let (conn, account, project) = setup();
    let p = get_project(&conn, project).unwrap();
    let mut t = list_transactions(&conn, &TransactionFilter::default())
        .unwrap()
        .into_iter()
        .find(|t| t.bank_account_id == account)
        .unwrap();
    t.project_account = Some(format!(" {} ", project));
    assert_eq!(project_match(&p, &t), Some(ProjectMatch::ById));
    t.project_account = Some("Food Drive".into());
    assert_eq!(project_match(&p, &t), Some(ProjectMatch::ByName));
    t.project_account = None;
    assert_eq!(project_match(&p, &t), None);
}

#[test]
fn verification_records_a_consistent_snapshot() {
    let (mut conn, _, project) = setup();
    let snapshot = request_verification(&mut conn, &AllowAll, project, &QueuedApproval).unwrap();
    assert!(snapshot.is_consistent());
    assert_eq!(snapshot.transaction_ids.len(), 3);
    assert_eq!(snapshot.project.name, "Food Drive");

    let stored = list_verification_requests(&conn, project).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, "pending");
    assert_eq!(stored[0].snapshot, snapshot);
}

#[test]
fn rejected_submission_leaves_no_request() {
    let (mut conn, _, project) = setup();
    let err = request_verification(&mut conn, &AllowAll, project, &Rejecting).unwrap_err();
    assert!(matches!(err, LedgerError::ExternalService(_)));
    assert!(list_verification_requests(&conn, project).unwrap().is_empty());

    let err = request_verification(&mut conn, &ReadOnly, project, &QueuedApproval).unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied(_)));
}

#[test]
fn tampered_snapshot_is_inconsistent() {
    let (mut conn, _, project) = setup();
    let mut snapshot =
        request_verification(&mut conn, &AllowAll, project, &QueuedApproval).unwrap();
    snapshot.transaction_ids.pop();
    assert!(!snapshot.is_consistent());
}

#[test]
fn project_names_are_validated() {
    let conn = db::open_in_memory().unwrap();
    let err = create_project(&conn, &AllowAll, "2024", d("0")).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    let err = create_project(&conn, &AllowAll, "  ", d("0")).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(create_project(&conn, &AllowAll, "Gala 2024", d("10")).is_ok());
    assert!(create_project(&conn, &AllowAll, "Gala 2024", d("10")).is_err());
}

#[test]
fn status_changes_need_an_existing_project() {
    let (conn, _, project) = setup();
    set_project_status(&conn, &AllowAll, project, ProjectStatus::Completed).unwrap();
    let err = set_project_status(&conn, &AllowAll, 404, ProjectStatus::Active).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}
