// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use chapterledger::db;
use chapterledger::errors::LedgerError;
use chapterledger::ledger::budgets::{
    UtilizationBand, Utilization, allocate, allocations_for, attribute, budget_status, classify,
    create_budget, get_budget, list_budgets, refresh_budget, set_budget_status, set_budget_total,
    unallocate,
};
use chapterledger::ledger::splits::{
    PurposeSelection, SplitCommand, SplitLine, apply_split, remove_split,
};
use chapterledger::ledger::store::{
    TransactionDraft, TransactionPatch, create_account, create_transaction, delete_account,
    delete_transaction, update_transaction,
};
use chapterledger::ledger::taxonomy::create_purpose;
use chapterledger::models::{BudgetStatus, CategoryTriple, Placement, Transaction, TransactionSplit};
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

struct Fixture {
    account: i64,
    events: i64,
    venue: i64,
    catering: i64,
    stationery: i64,
}

fn setup() -> (Connection, Fixture) {
    let conn = db::open_in_memory().unwrap();
    let caps = AllowAll;
    let account = create_account(&conn, &caps, "Current", "current", d("0"))
        .unwrap()
        .id;
    let ops = create_purpose(&conn, &caps, "Operations", Placement::Main)
        .unwrap()
        .id;
    let events = create_purpose(&conn, &caps, "Events", Placement::Business { main_id: ops })
        .unwrap()
        .id;
    let admin = create_purpose(&conn, &caps, "Admin", Placement::Business { main_id: ops })
        .unwrap()
        .id;
    let venue = create_purpose(
        &conn,
        &caps,
        "Venue",
        Placement::Specific {
            business_id: events,
        },
    )
    .unwrap()
    .id;
    let catering = create_purpose(
        &conn,
        &caps,
        "Catering",
        Placement::Specific {
            business_id: events,
        },
    )
    .unwrap()
    .id;
    let stationery = create_purpose(
        &conn,
        &caps,
        "Stationery",
        Placement::Specific { business_id: admin },
    )
    .unwrap()
    .id;
    (
        conn,
        Fixture {
            account,
            events,
            venue,
            catering,
            stationery,
        },
    )
}

fn spend(conn: &mut Connection, f: &Fixture, date: &str, amount: &str, purpose: i64) -> i64 {
    create_transaction(
        conn,
        &AllowAll,
        TransactionDraft::new(f.account, day(date), "spend")
            .expense(d(amount))
            .purpose(purpose),
    )
    .unwrap()
    .id
}

#[test]
fn utilization_band_boundaries() {
    assert_eq!(classify(d("79.9")), UtilizationBand::Normal);
    assert_eq!(classify(d("80.0")), UtilizationBand::Warning);
    assert_eq!(classify(d("100")), UtilizationBand::Warning);
    assert_eq!(classify(d("100.1")), UtilizationBand::Exception);

    let u = Utilization::of(d("799"), d("1000"));
    assert_eq!(u.percent, d("79.9"));
    assert_eq!(u.band, UtilizationBand::Normal);
    assert_eq!(Utilization::of(d("1001"), d("1000")).band, UtilizationBand::Exception);
}

#[test]
fn zero_base_utilization() {
    let idle = Utilization::of(Decimal::ZERO, Decimal::ZERO);
    assert_eq!(idle.percent, Decimal::ZERO);
    assert_eq!(idle.band, UtilizationBand::Normal);
    let over = Utilization::of(d("5"), Decimal::ZERO);
    assert_eq!(over.percent, Decimal::ZERO);
    assert_eq!(over.band, UtilizationBand::Exception);
}

#[test]
fn split_parts_carry_expense_in_parent_proportion() {
    let parent = Transaction {
        id: 1,
        bank_account_id: 1,
        date: day("2024-05-01"),
        main_description: "Ticket sales net of hall".into(),
        sub_description: None,
        income: d("100"),
        expense: d("300"),
        payer_payee: None,
        category: CategoryTriple::default(),
        project_account: None,
        audit_year: 2024,
        reference_no: None,
        version: 1,
    };
    let part = |idx: i64, amount: &str, specific: i64| TransactionSplit {
        id: idx,
        transaction_id: 1,
        split_index: idx,
        amount: d(amount),
        category: CategoryTriple {
            main: None,
            business: None,
            specific: Some(specific),
        },
        description: None,
    };
    let mut splits = HashMap::new();
    splits.insert(1, vec![part(1, "200", 10), part(2, "200", 11)]);

    let attrs = attribute(&[parent], &splits);
    assert_eq!(attrs.len(), 2);
    assert_eq!(attrs[0].expense, d("150"));
    assert_eq!(attrs[0].income, d("50"));
    assert_eq!(attrs[1].purpose_id, Some(11));
}

#[test]
fn allocation_spend_is_derived_from_subtree() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    spend(&mut conn, &f, "2024-02-01", "120", f.venue);
    spend(&mut conn, &f, "2024-02-02", "30", f.catering);
    spend(&mut conn, &f, "2024-02-03", "45", f.stationery);
    // outside the budget year
    spend(&mut conn, &f, "2023-12-31", "500", f.venue);

    let alloc = allocate(&mut conn, &AllowAll, budget.id, f.events, d("400")).unwrap();
    assert_eq!(alloc.spent_amount, d("150"));
    assert_eq!(alloc.remaining_amount, d("250"));

    let b = get_budget(&conn, budget.id).unwrap();
    assert_eq!(b.allocated_amount, d("400"));
    assert_eq!(b.spent_amount, d("150"));
    assert_eq!(b.remaining_amount, d("850"));

    let view = budget_status(&conn, budget.id).unwrap();
    assert_eq!(view.allocations.len(), 1);
    assert_eq!(view.allocations[0].purpose_path, "Operations > Events");
    assert_eq!(view.allocations[0].utilization.percent, d("37.5"));
    assert_eq!(view.utilization.percent, d("15"));
}

#[test]
fn status_view_tracks_spend_recorded_after_allocation() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("200")).unwrap();
    allocate(&mut conn, &AllowAll, budget.id, f.venue, d("100")).unwrap();
    spend(&mut conn, &f, "2024-07-01", "85", f.venue);

    let view = budget_status(&conn, budget.id).unwrap();
    assert_eq!(view.allocations[0].spent_amount, d("85"));
    assert_eq!(view.allocations[0].utilization.band, UtilizationBand::Warning);

    let stored = get_budget(&conn, budget.id).unwrap();
    assert_eq!(stored.spent_amount, view.budget.spent_amount);
    assert_eq!(stored.remaining_amount, d("115"));
    let refreshed = refresh_budget(&mut conn, budget.id).unwrap();
    assert_eq!(refreshed.spent_amount, d("85"));
}

#[test]
fn stored_figures_follow_transaction_and_split_changes() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    allocate(&mut conn, &AllowAll, budget.id, f.venue, d("500")).unwrap();
    let stored = |conn: &Connection| {
        let b = get_budget(conn, budget.id).unwrap();
        let a = allocations_for(conn, budget.id).unwrap();
        (b.spent_amount, b.remaining_amount, a[0].spent_amount, a[0].remaining_amount)
    };

    let tx = spend(&mut conn, &f, "2024-03-01", "200", f.venue);
    assert_eq!(stored(&conn), (d("200"), d("800"), d("200"), d("300")));
    assert_eq!(list_budgets(&conn, Some(2024)).unwrap()[0].spent_amount, d("200"));

    update_transaction(
        &mut conn,
        &AllowAll,
        tx,
        TransactionPatch {
            expense: Some(d("250")),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(stored(&conn).0, d("250"));

    apply_split(
        &mut conn,
        &AllowAll,
        &SplitCommand::new(
            tx,
            vec![
                SplitLine::new(d("100"), PurposeSelection::flat(f.venue)),
                SplitLine::new(d("150"), PurposeSelection::flat(f.stationery)),
            ],
        ),
    )
    .unwrap();
    assert_eq!(stored(&conn), (d("100"), d("900"), d("100"), d("400")));

    remove_split(&mut conn, &AllowAll, tx).unwrap();
    assert_eq!(stored(&conn).0, d("250"));

    // moving the transaction out of the budget year
    update_transaction(
        &mut conn,
        &AllowAll,
        tx,
        TransactionPatch {
            audit_year: Some(2025),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(stored(&conn).0, d("0"));

    let other = spend(&mut conn, &f, "2024-04-01", "40", f.venue);
    assert_eq!(stored(&conn).0, d("40"));
    delete_transaction(&mut conn, &AllowAll, other).unwrap();
    assert_eq!(stored(&conn), (d("0"), d("1000"), d("0"), d("500")));

    spend(&mut conn, &f, "2024-05-01", "60", f.venue);
    delete_account(&conn, &AllowAll, f.account).unwrap();
    let live = budget_status(&conn, budget.id).unwrap();
    assert_eq!(stored(&conn).0, live.budget.spent_amount);
    assert_eq!(live.budget.spent_amount, d("0"));
}

#[test]
fn mixed_split_attribution_keeps_the_parent_expense() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    let tx = create_transaction(
        &mut conn,
        &AllowAll,
        TransactionDraft::new(f.account, day("2024-06-01"), "Fair stall")
            .income(d("100"))
            .expense(d("200")),
    )
    .unwrap();
    apply_split(
        &mut conn,
        &AllowAll,
        &SplitCommand::new(
            tx.id,
            vec![
                SplitLine::new(d("100"), PurposeSelection::flat(f.venue)),
                SplitLine::new(d("100"), PurposeSelection::flat(f.catering)),
                SplitLine::new(d("100"), PurposeSelection::flat(f.stationery)),
            ],
        ),
    )
    .unwrap();
    for purpose in [f.venue, f.catering, f.stationery] {
        allocate(&mut conn, &AllowAll, budget.id, purpose, d("100")).unwrap();
    }

    let view = budget_status(&conn, budget.id).unwrap();
    assert_eq!(view.budget.spent_amount, d("200"));
    let spent: Vec<Decimal> = view.allocations.iter().map(|a| a.spent_amount).collect();
    assert_eq!(spent, vec![d("66.67"), d("66.67"), d("66.66")]);
    assert_eq!(get_budget(&conn, budget.id).unwrap().spent_amount, d("200"));
}

#[test]
fn refresh_is_idempotent() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    allocate(&mut conn, &AllowAll, budget.id, f.events, d("500")).unwrap();
    spend(&mut conn, &f, "2024-03-03", "64.20", f.catering);

    let once = refresh_budget(&mut conn, budget.id).unwrap();
    let twice = refresh_budget(&mut conn, budget.id).unwrap();
    assert_eq!(once.remaining_amount, twice.remaining_amount);
    assert_eq!(once.spent_amount, twice.spent_amount);
    assert_eq!(twice.remaining_amount, d("935.80"));
    assert!(twice.version > once.version);
}

#[test]
fn split_spend_lands_on_each_part_purpose() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    let tx = create_transaction(
        &mut conn,
        &AllowAll,
        TransactionDraft::new(f.account, day("2024-04-04"), "Dinner").expense(d("300")),
    )
    .unwrap();
    apply_split(
        &mut conn,
        &AllowAll,
        &SplitCommand::new(
            tx.id,
            vec![
                SplitLine::new(d("200"), PurposeSelection::flat(f.venue)),
                SplitLine::new(d("100"), PurposeSelection::flat(f.stationery)),
            ],
        ),
    )
    .unwrap();
    allocate(&mut conn, &AllowAll, budget.id, f.venue, d("250")).unwrap();
    allocate(&mut conn, &AllowAll, budget.id, f.stationery, d("50")).unwrap();

    let view = budget_status(&conn, budget.id).unwrap();
    let spent: Vec<Decimal> = view.allocations.iter().map(|a| a.spent_amount).collect();
    assert_eq!(spent, vec![d("200"), d("100")]);
    assert_eq!(view.allocations[1].utilization.band, UtilizationBand::Exception);
    assert_eq!(view.budget.spent_amount, d("300"));
}

#[test]
fn overlapping_allocations_are_rejected() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    allocate(&mut conn, &AllowAll, budget.id, f.events, d("300")).unwrap();
    let err = allocate(&mut conn, &AllowAll, budget.id, f.venue, d("100")).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    // replacing the same purpose is an update, not an overlap
    let again = allocate(&mut conn, &AllowAll, budget.id, f.events, d("350")).unwrap();
    assert_eq!(again.allocated_amount, d("350"));
    assert_eq!(get_budget(&conn, budget.id).unwrap().allocated_amount, d("350"));
}

#[test]
fn unallocate_and_total_changes_keep_remaining_consistent() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    spend(&mut conn, &f, "2024-01-15", "100", f.venue);
    allocate(&mut conn, &AllowAll, budget.id, f.venue, d("300")).unwrap();
    allocate(&mut conn, &AllowAll, budget.id, f.stationery, d("200")).unwrap();

    let b = set_budget_total(&mut conn, &AllowAll, budget.id, d("600")).unwrap();
    assert_eq!(b.remaining_amount, d("500"));

    let b = unallocate(&mut conn, &AllowAll, budget.id, f.venue).unwrap();
    assert_eq!(b.allocated_amount, d("200"));
    assert_eq!(b.spent_amount, d("0"));
    assert_eq!(b.remaining_amount, d("600"));

    let err = unallocate(&mut conn, &AllowAll, budget.id, f.venue).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[test]
fn closed_budget_and_read_only_sessions_cannot_allocate() {
    let (mut conn, f) = setup();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    set_budget_status(&conn, &AllowAll, budget.id, BudgetStatus::Closed).unwrap();
    let err = allocate(&mut conn, &AllowAll, budget.id, f.venue, d("10")).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = allocate(&mut conn, &ReadOnly, budget.id, f.venue, d("10")).unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied(_)));
    assert!(create_budget(&conn, &ReadOnly, "Other", 2024, d("1")).is_err());
}

#[test]
fn duplicate_budget_per_year_is_a_validation_error() {
    let (conn, _) = setup();
    create_budget(&conn, &AllowAll, "Chapter", 2024, d("1000")).unwrap();
    let err = create_budget(&conn, &AllowAll, "Chapter", 2024, d("5")).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(create_budget(&conn, &AllowAll, "Chapter", 2025, d("5")).is_ok());
}
