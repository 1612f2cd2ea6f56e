// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chapterledger::commands::splits::parse_part;
use chapterledger::db;
use chapterledger::errors::LedgerError;
use chapterledger::ledger::balances::compute_running_balances;
use chapterledger::ledger::splits::{
    PurposeSelection, SplitCommand, SplitLine, SplitState, apply_split, archived_categorization,
    list_splits, remove_split, split_progress, split_state, validate_split,
};
use chapterledger::ledger::store::{
    TransactionDraft, create_account, create_transaction, get_account, get_transaction,
};
use chapterledger::ledger::taxonomy::{Taxonomy, create_purpose};
use chapterledger::models::{CategoryTriple, Placement, Transaction};
use chapterledger::permissions::{AllowAll, ReadOnly};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

struct Fixture {
    account: i64,
    ops: i64,
    events: i64,
    venue: i64,
    catering: i64,
    admin: i64,
    stationery: i64,
}

fn setup() -> (Connection, Fixture) {
    let conn = db::open_in_memory().unwrap();
    let caps = AllowAll;
    let account = create_account(&conn, &caps, "Chapter Current", "current", d("500"))
        .unwrap()
        .id;
    let ops = create_purpose(&conn, &caps, "Operations", Placement::Main)
        .unwrap()
        .id;
    let events = create_purpose(&conn, &caps, "Events", Placement::Business { main_id: ops })
        .unwrap()
        .id;
    let venue = create_purpose(
        &conn,
        &caps,
        "Venue hire",
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
    let admin = create_purpose(&conn, &caps, "Admin", Placement::Business { main_id: ops })
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
            ops,
            events,
            venue,
            catering,
            admin,
            stationery,
        },
    )
}

fn expense_tx(conn: &mut Connection, f: &Fixture, amount: &str, purpose: Option<i64>) -> Transaction {
    let mut draft = TransactionDraft::new(
        f.account,
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        "Spring dinner",
    )
    .expense(d(amount))
    .payer_payee("Riverside Hotel");
    if let Some(p) = purpose {
        draft = draft.purpose(p);
    }
    create_transaction(conn, &AllowAll, draft).unwrap()
}

fn two_way(f: &Fixture, a: &str, b: &str) -> Vec<SplitLine> {
    vec![
        SplitLine::new(d(a), PurposeSelection::flat(f.venue)).with_description("hall"),
        SplitLine::new(d(b), PurposeSelection::flat(f.catering)),
    ]
}

#[test]
fn applied_split_conserves_amount_and_clears_parent() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "300", Some(f.venue));
    let parts = apply_split(&mut conn, &AllowAll, &SplitCommand::new(tx.id, two_way(&f, "200", "100")))
        .unwrap();

    let total: Decimal = parts.iter().map(|p| p.amount).sum();
    assert_eq!(total, tx.income + tx.expense);
    assert_eq!(
        parts.iter().map(|p| p.split_index).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(parts[0].description.as_deref(), Some("hall"));
    assert_eq!(parts[1].category.specific, Some(f.catering));

    let parent = get_transaction(&conn, tx.id).unwrap();
    assert!(parent.category.is_empty());
    assert_eq!(parent.payer_payee, None);
    assert!(split_state(&conn, tx.id).unwrap().is_split());
}

#[test]
fn fewer_than_two_parts_is_rejected() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "300", None);
    let err = apply_split(
        &mut conn,
        &AllowAll,
        &SplitCommand::new(
            tx.id,
            vec![SplitLine::new(d("300"), PurposeSelection::flat(f.venue))],
        ),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(split_state(&conn, tx.id).unwrap(), SplitState::Unsplit);
}

#[test]
fn mismatched_sum_writes_nothing() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "300", Some(f.venue));
    let err = apply_split(&mut conn, &AllowAll, &SplitCommand::new(tx.id, two_way(&f, "200", "99.98")))
        .unwrap_err();
    match err {
        LedgerError::AmountMismatch { expected, actual } => {
            assert_eq!(expected, d("300"));
            assert_eq!(actual, d("299.98"));
        }
        other => panic!("unexpected error {other}"),
    }
    let parent = get_transaction(&conn, tx.id).unwrap();
    assert_eq!(parent.category.specific, Some(f.venue));
    assert_eq!(parent.version, tx.version);
    assert!(list_splits(&conn, tx.id).unwrap().is_empty());
    assert!(archived_categorization(&conn, tx.id).unwrap().is_none());
}

#[test]
fn one_cent_rounding_is_tolerated() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "100", None);
    let parts = apply_split(
        &mut conn,
        &AllowAll,
        &SplitCommand::new(tx.id, two_way(&f, "33.33", "66.66")),
    )
    .unwrap();
    assert_eq!(parts.len(), 2);
}

#[test]
fn remove_split_restores_archived_categorization() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "300", Some(f.venue));
    apply_split(&mut conn, &AllowAll, &SplitCommand::new(tx.id, two_way(&f, "200", "100"))).unwrap();
    // re-splitting keeps the first archive
    apply_split(&mut conn, &AllowAll, &SplitCommand::new(tx.id, two_way(&f, "150", "150"))).unwrap();

    let restored = remove_split(&mut conn, &AllowAll, tx.id).unwrap();
    assert_eq!(
        restored.category,
        CategoryTriple {
            main: Some(f.ops),
            business: Some(f.events),
            specific: Some(f.venue),
        }
    );
    assert_eq!(restored.payer_payee.as_deref(), Some("Riverside Hotel"));
    assert!(list_splits(&conn, tx.id).unwrap().is_empty());
    assert!(archived_categorization(&conn, tx.id).unwrap().is_none());

    let err = remove_split(&mut conn, &AllowAll, tx.id).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn splitting_never_moves_balances() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "300", None);
    let before = compute_running_balances(&conn, f.account).unwrap();
    let revision = get_account(&conn, f.account).unwrap().revision;

    apply_split(&mut conn, &AllowAll, &SplitCommand::new(tx.id, two_way(&f, "120", "180"))).unwrap();

    let after = compute_running_balances(&conn, f.account).unwrap();
    assert_eq!(before.as_map(), after.as_map());
    assert_eq!(after.closing, d("200"));
    assert_eq!(get_account(&conn, f.account).unwrap().revision, revision);
}

#[test]
fn stale_expected_version_conflicts() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "300", None);
    let mut cmd = SplitCommand::new(tx.id, two_way(&f, "200", "100"));
    cmd.expected_version = Some(tx.version + 5);
    let err = apply_split(&mut conn, &AllowAll, &cmd).unwrap_err();
    assert!(err.is_conflict());
    assert!(list_splits(&conn, tx.id).unwrap().is_empty());
}

#[test]
fn read_only_cannot_split() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "300", None);
    let err = apply_split(&mut conn, &ReadOnly, &SplitCommand::new(tx.id, two_way(&f, "200", "100")))
        .unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied(_)));
}

#[test]
fn complete_cascade_wins_over_fallback() {
    let (conn, f) = setup();
    let taxonomy = Taxonomy::load(&conn).unwrap();

    let mut sel = PurposeSelection::flat(f.stationery);
    sel.choose_main(f.ops);
    sel.choose_business(f.events);
    // incomplete cascade: fallback applies
    assert_eq!(sel.resolve(&taxonomy).unwrap(), f.stationery);
    sel.choose_specific(f.catering);
    assert_eq!(sel.resolve(&taxonomy).unwrap(), f.catering);

    // choosing a new main clears what was picked below it
    sel.choose_main(f.ops);
    assert_eq!(sel.business, None);
    assert_eq!(sel.specific, None);

    let partial = {
        let mut s = PurposeSelection::default();
        s.choose_main(f.ops);
        s.choose_business(f.admin);
        s
    };
    assert_eq!(partial.resolve(&taxonomy).unwrap(), f.admin);
    assert!(matches!(
        PurposeSelection::default().resolve(&taxonomy),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn cascade_links_must_follow_the_tree() {
    let (conn, f) = setup();
    let taxonomy = Taxonomy::load(&conn).unwrap();
    let bad = PurposeSelection::cascade(f.ops, f.admin, f.venue);
    assert!(matches!(
        bad.resolve(&taxonomy),
        Err(LedgerError::Validation(_))
    ));
    let swapped = PurposeSelection::cascade(f.events, f.ops, f.venue);
    assert!(swapped.resolve(&taxonomy).is_err());
}

#[test]
fn validation_reports_progress_and_unknown_purposes() {
    let (mut conn, f) = setup();
    let tx = expense_tx(&mut conn, &f, "300", None);
    let taxonomy = Taxonomy::load(&conn).unwrap();
    let lines = vec![
        SplitLine::new(d("200"), PurposeSelection::flat(f.venue)),
        SplitLine::new(d("50"), PurposeSelection::flat(4040)),
    ];
    let progress = split_progress(&tx, &lines);
    assert_eq!(progress.remaining, d("50"));
    assert!(!progress.balanced);
    assert!(matches!(
        validate_split(&tx, &lines, &taxonomy),
        Err(LedgerError::NotFound { .. })
    ));
}

#[test]
fn cli_parts_parse_into_selections() {
    let (conn, f) = setup();
    let taxonomy = Taxonomy::load(&conn).unwrap();

    let flat = parse_part(&format!("120.50={}:chairs", f.venue)).unwrap();
    assert_eq!(flat.amount, d("120.50"));
    assert_eq!(flat.selection.fallback, Some(f.venue));
    assert_eq!(flat.description.as_deref(), Some("chairs"));

    let cascade = parse_part(&format!("30={}/{}/{}", f.ops, f.admin, f.stationery)).unwrap();
    assert!(cascade.selection.is_cascade_complete());
    assert_eq!(cascade.selection.resolve(&taxonomy).unwrap(), f.stationery);

    assert!(parse_part("30").is_err());
    assert!(parse_part("x=1").is_err());
    assert!(parse_part("5=1/2/3/4").is_err());
}
