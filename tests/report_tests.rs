// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use chapterledger::db;
use chapterledger::errors::LedgerError;
use chapterledger::ledger::budgets::{allocate, create_budget};
use chapterledger::ledger::reports::{Period, assemble, financial_report, variance_percentage};
use chapterledger::ledger::splits::{PurposeSelection, SplitCommand, SplitLine, apply_split};
use chapterledger::ledger::store::{TransactionDraft, create_account, create_transaction};
use chapterledger::ledger::taxonomy::{Taxonomy, UNCATEGORIZED, create_purpose};
use chapterledger::models::{
    BudgetAllocation, CategoryTriple, Placement, PurposeLevel, PurposeNode, Transaction,
};
use chapterledger::permissions::AllowAll;
use chrono::NaiveDate;
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn node(id: i64, name: &str, level: PurposeLevel, parent_id: Option<i64>) -> PurposeNode {
    PurposeNode {
        id,
        name: name.into(),
        level,
        parent_id,
        is_active: true,
    }
}

fn tx(id: i64, date: &str, income: &str, expense: &str, purpose: Option<i64>) -> Transaction {
    Transaction {
        id,
        bank_account_id: 1,
        date: day(date),
        main_description: "entry".into(),
        sub_description: None,
        income: d(income),
        expense: d(expense),
        payer_payee: None,
        category: CategoryTriple {
            main: None,
            business: None,
            specific: purpose,
        },
        project_account: None,
        audit_year: 2024,
        reference_no: None,
        version: 1,
    }
}

fn allocation(purpose_id: i64, amount: &str) -> BudgetAllocation {
    BudgetAllocation {
        id: purpose_id,
        budget_id: 1,
        purpose_id,
        allocated_amount: d(amount),
        spent_amount: Decimal::ZERO,
        remaining_amount: d(amount),
    }
}

#[test]
fn period_must_not_end_before_it_starts() {
    let err = Period::new(day("2024-02-01"), day("2024-01-31")).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    let p = Period::new(day("2024-01-01"), day("2024-01-01")).unwrap();
    assert!(p.contains(day("2024-01-01")));
    assert!(!p.contains(day("2024-01-02")));
}

#[test]
fn variance_is_relative_to_budgeted() {
    assert_eq!(variance_percentage(d("200"), d("250")), d("25"));
    assert_eq!(variance_percentage(d("200"), d("150")), d("-25"));
    assert_eq!(variance_percentage(Decimal::ZERO, d("75")), Decimal::ZERO);
}

#[test]
fn assemble_totals_variances_and_spend() {
    let taxonomy = Taxonomy::from_nodes(vec![
        node(1, "Operations", PurposeLevel::Main, None),
        node(2, "Events", PurposeLevel::Business, Some(1)),
        node(3, "Venue", PurposeLevel::Specific, Some(2)),
        node(4, "Outreach", PurposeLevel::Main, None),
    ]);
    let period = Period::new(day("2024-01-01"), day("2024-03-31")).unwrap();
    let txs = vec![
        tx(1, "2024-01-10", "0", "120", Some(3)),
        tx(2, "2024-02-10", "0", "30", None),
        tx(3, "2024-02-11", "500", "0", None),
        tx(4, "2024-03-01", "0", "60", Some(4)),
        // outside the period
        tx(5, "2024-04-01", "0", "999", Some(3)),
    ];
    let report = assemble(
        period,
        &txs,
        &HashMap::new(),
        &[allocation(2, "100"), allocation(4, "0")],
        &taxonomy,
    );

    assert_eq!(report.transaction_count, 4);
    assert_eq!(report.total_income, d("500"));
    assert_eq!(report.total_expense, d("210"));
    assert_eq!(report.net_income, d("290"));

    assert_eq!(report.variances[0].purpose_path, "Operations > Events");
    assert_eq!(report.variances[0].actual, d("120"));
    assert_eq!(report.variances[0].variance, d("20"));
    assert_eq!(report.variances[0].variance_percentage, d("20"));
    assert_eq!(report.variances[1].variance, d("60"));
    assert_eq!(report.variances[1].variance_percentage, Decimal::ZERO);

    let paths: Vec<&str> = report
        .spend_by_purpose
        .iter()
        .map(|s| s.purpose_path.as_str())
        .collect();
    assert_eq!(
        paths,
        vec!["Operations > Events > Venue", "Outreach", UNCATEGORIZED]
    );
}

#[test]
fn report_reads_splits_and_budget_from_store() {
    let mut conn = db::open_in_memory().unwrap();
    let account = create_account(&conn, &AllowAll, "Current", "current", d("0"))
        .unwrap()
        .id;
    let ops = create_purpose(&conn, &AllowAll, "Operations", Placement::Main)
        .unwrap()
        .id;
    let events = create_purpose(&conn, &AllowAll, "Events", Placement::Business { main_id: ops })
        .unwrap()
        .id;
    let admin = create_purpose(&conn, &AllowAll, "Admin", Placement::Business { main_id: ops })
        .unwrap()
        .id;
    let tx = create_transaction(
        &mut conn,
        &AllowAll,
        TransactionDraft::new(account, day("2024-05-05"), "Shared invoice").expense(d("90")),
    )
    .unwrap();
    apply_split(
        &mut conn,
        &AllowAll,
        &SplitCommand::new(
            tx.id,
            vec![
                SplitLine::new(d("60"), PurposeSelection::flat(events)),
                SplitLine::new(d("30"), PurposeSelection::flat(admin)),
            ],
        ),
    )
    .unwrap();
    let budget = create_budget(&conn, &AllowAll, "Chapter", 2024, d("500")).unwrap();
    allocate(&mut conn, &AllowAll, budget.id, events, d("50")).unwrap();

    let period = Period::new(day("2024-05-01"), day("2024-05-31")).unwrap();
    let report = financial_report(&conn, period, Some(budget.id)).unwrap();
    assert_eq!(report.total_expense, d("90"));
    assert_eq!(report.variances.len(), 1);
    assert_eq!(report.variances[0].actual, d("60"));
    assert_eq!(report.variances[0].variance, d("10"));
    assert_eq!(report.spend_by_purpose[0].purpose_path, "Operations > Events");

    let without = financial_report(&conn, period, None).unwrap();
    assert!(without.variances.is_empty());

    let err = financial_report(&conn, period, Some(77)).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}
