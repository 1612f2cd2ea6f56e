// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::cell::Cell;

use chapterledger::commands::doctor::find_issues;
use chapterledger::db;
use chapterledger::errors::{LedgerError, retry_on_conflict};
use chapterledger::ledger::balances::compute_running_balances;
use chapterledger::ledger::budgets::{
    UtilizationBand, allocate, budget_status, create_budget, refresh_budget,
};
use chapterledger::ledger::projects::create_project;
use chapterledger::ledger::splits::{PurposeSelection, SplitCommand, SplitLine, apply_split};
use chapterledger::ledger::store::{TransactionDraft, create_account, create_transaction};
use chapterledger::ledger::taxonomy::create_purpose;
use chapterledger::models::Placement;
use chapterledger::permissions::AllowAll;
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

struct Scenario {
    account: i64,
    transaction: i64,
    main: i64,
    p1: i64,
}

/// An account opened with 500, one 300 expense split 200/100 across two
/// specific purposes.
fn scenario() -> (Connection, Scenario) {
    let mut conn = db::open_in_memory().unwrap();
    let caps = AllowAll;
    let account = create_account(&conn, &caps, "Chapter Current", "current", d("500"))
        .unwrap()
        .id;
    let main = create_purpose(&conn, &caps, "Operations", Placement::Main)
        .unwrap()
        .id;
    let business = create_purpose(&conn, &caps, "Events", Placement::Business { main_id: main })
        .unwrap()
        .id;
    let p1 = create_purpose(
        &conn,
        &caps,
        "Venue",
        Placement::Specific {
            business_id: business,
        },
    )
    .unwrap()
    .id;
    let p2 = create_purpose(
        &conn,
        &caps,
        "Catering",
        Placement::Specific {
            business_id: business,
        },
    )
    .unwrap()
    .id;
    let transaction = create_transaction(
        &mut conn,
        &caps,
        TransactionDraft::new(account, day("2024-03-01"), "Spring dinner").expense(d("300")),
    )
    .unwrap()
    .id;
    apply_split(
        &mut conn,
        &caps,
        &SplitCommand::new(
            transaction,
            vec![
                SplitLine::new(d("200"), PurposeSelection::flat(p1)),
                SplitLine::new(d("100"), PurposeSelection::flat(p2)),
            ],
        ),
    )
    .unwrap();
    (
        conn,
        Scenario {
            account,
            transaction,
            main,
            p1,
        },
    )
}

#[test]
fn split_expense_flows_into_balance_and_budget() {
    let (mut conn, s) = scenario();

    let balances = compute_running_balances(&conn, s.account).unwrap();
    assert_eq!(balances.closing, d("200"));
    assert_eq!(balances.balance_after(s.transaction), Some(d("200")));

    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    let alloc = allocate(&mut conn, &AllowAll, budget.id, s.p1, d("500")).unwrap();
    assert_eq!(alloc.spent_amount, d("200"));
    assert_eq!(alloc.remaining_amount, d("300"));

    let stored = refresh_budget(&mut conn, budget.id).unwrap();
    assert_eq!(stored.spent_amount, d("200"));
    assert_eq!(stored.remaining_amount, d("800"));

    let view = budget_status(&conn, budget.id).unwrap();
    assert_eq!(view.utilization.percent, d("20"));
    assert_eq!(view.utilization.band, UtilizationBand::Normal);
    assert_eq!(
        view.allocations[0].purpose_path,
        "Operations > Events > Venue"
    );
    assert!(find_issues(&conn).unwrap().is_empty());
}

#[test]
fn doctor_reports_store_damage() {
    let (mut conn, s) = scenario();
    let project = create_project(&conn, &AllowAll, "Food Drive", d("0")).unwrap();
    create_transaction(
        &mut conn,
        &AllowAll,
        TransactionDraft::new(s.account, day("2024-03-02"), "Tins")
            .expense(d("10"))
            .project("Food Drive"),
    )
    .unwrap();
    conn.execute(
        "UPDATE purposes SET parent_id=?1 WHERE id=?2",
        params![s.p1, s.main],
    )
    .unwrap();
    conn.execute(
        "UPDATE transaction_splits SET amount='150' WHERE transaction_id=?1 AND split_index=1",
        params![s.transaction],
    )
    .unwrap();

    let issues = find_issues(&conn).unwrap();
    let kinds: Vec<&str> = issues.iter().map(|i| i.kind).collect();
    assert!(kinds.contains(&"purpose_cycle"));
    assert!(kinds.contains(&"split_not_conserved"));
    let by_name = issues
        .iter()
        .find(|i| i.kind == "project_name_reference")
        .unwrap();
    assert!(by_name.detail.contains(&project.id.to_string()));
    assert!(!kinds.contains(&"split_without_archive"));
}

#[test]
fn conflicts_are_retried_exactly_once() {
    let calls = Cell::new(0);
    let out = retry_on_conflict(|| {
        calls.set(calls.get() + 1);
        if calls.get() == 1 {
            Err(LedgerError::ConcurrencyConflict {
                entity: "transaction",
                id: 1,
            })
        } else {
            Ok(calls.get())
        }
    });
    assert_eq!(out.unwrap(), 2);

    let calls = Cell::new(0);
    let out: Result<(), LedgerError> = retry_on_conflict(|| {
        calls.set(calls.get() + 1);
        Err(LedgerError::ConcurrencyConflict {
            entity: "budget",
            id: 1,
        })
    });
    assert!(out.unwrap_err().is_conflict());
    assert_eq!(calls.get(), 2);

    let calls = Cell::new(0);
    let out: Result<(), LedgerError> = retry_on_conflict(|| {
        calls.set(calls.get() + 1);
        Err(LedgerError::validation("bad input"))
    });
    assert!(out.is_err());
    assert_eq!(calls.get(), 1);
}
