// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chapterledger::ledger::projects::create_project;
use chapterledger::ledger::store::{
    TransactionFilter, create_account, list_transactions,
};
use chapterledger::ledger::taxonomy::create_purpose;
use chapterledger::models::Placement;
use chapterledger::permissions::{AllowAll, ReadOnly};
use chapterledger::{cli, commands::importer, db};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::io::Write;
use tempfile::NamedTempFile;

fn base_conn() -> (Connection, i64) {
    let conn = db::open_in_memory().unwrap();
    create_account(&conn, &AllowAll, "A1", "bank", Decimal::ZERO).unwrap();
    let ops = create_purpose(&conn, &AllowAll, "Operations", Placement::Main)
        .unwrap()
        .id;
    let events = create_purpose(&conn, &AllowAll, "Events", Placement::Business { main_id: ops })
        .unwrap()
        .id;
    let venue = create_purpose(
        &conn,
        &AllowAll,
        "Venue",
        Placement::Specific {
            business_id: events,
        },
    )
    .unwrap()
    .id;
    (conn, venue)
}

fn csv_file(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", body).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn importer_trims_cli_path_argument() {
    let (mut conn, _) = base_conn();
    let file = csv_file(
        "date,account,description,income,expense,payee,purpose,project,reference\n\
         2025-02-03,A1,Stamps,,5.00,Post office,,,\n",
    );

    let path = file.path().to_str().unwrap().to_string();
    let padded = format!("  {}  ", path);
    let cli = cli::build_cli();
    let matches =
        cli.get_matches_from(["chapterledger", "import", "transactions", "--path", &padded]);
    if let Some(("import", import_m)) = matches.subcommand() {
        importer::handle(&mut conn, &AllowAll, import_m).unwrap();
    } else {
        panic!("no import subcommand");
    }

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn bad_rows_are_reported_and_the_rest_imported() {
    let (mut conn, venue) = base_conn();
    let project = create_project(&conn, &AllowAll, "Gala", Decimal::ZERO).unwrap();
    let file = csv_file(
        "date,account,description,income,expense,payee,purpose,project,reference\n\
         2025-03-01,A1,Hall,,120,Town Hall,operations > events > venue,Gala,INV-1\n\
         2025-03-02,Nowhere,Lost,,10,,,,\n\
         2025-03-03,A1,Dues,40,,Member,,,\n\
         03/04/2025,A1,Bad date,,1,,,,\n",
    );

    let outcome =
        importer::import_transactions(&mut conn, &AllowAll, file.path().to_str().unwrap())
            .unwrap();
    assert_eq!(outcome.succeeded, vec![1, 3]);
    let failed: Vec<i64> = outcome.failed.iter().map(|f| f.item).collect();
    assert_eq!(failed, vec![2, 4]);

    let txs = list_transactions(&conn, &TransactionFilter::default()).unwrap();
    let hall = txs.iter().find(|t| t.main_description == "Hall").unwrap();
    assert_eq!(hall.category.specific, Some(venue));
    assert_eq!(hall.project_account, Some(project.id.to_string()));
    assert_eq!(hall.reference_no.as_deref(), Some("INV-1"));
    assert_eq!(hall.expense, Decimal::new(120, 0));
}

#[test]
fn read_only_session_cannot_import() {
    let (mut conn, _) = base_conn();
    let file = csv_file(
        "date,account,description,income,expense,payee,purpose,project,reference\n\
         2025-02-03,A1,Stamps,,5.00,,,,\n",
    );
    assert!(importer::import_transactions(&mut conn, &ReadOnly, file.path().to_str().unwrap())
        .is_err());
    assert!(list_transactions(&conn, &TransactionFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn purpose_path_shared_by_two_purposes_fails_the_row() {
    let (mut conn, _) = base_conn();
    let grants = create_purpose(&conn, &AllowAll, "Grants", Placement::Main)
        .unwrap()
        .id;
    create_purpose(&conn, &AllowAll, "Grants", Placement::Main).unwrap();
    let file = csv_file(&format!(
        "date,account,description,income,expense,payee,purpose,project,reference\n\
         2025-04-01,A1,Award,500,,Council,Grants,,\n\
         2025-04-02,A1,Award by id,250,,Council,{},,\n",
        grants
    ));

    let outcome =
        importer::import_transactions(&mut conn, &AllowAll, file.path().to_str().unwrap())
            .unwrap();
    assert_eq!(outcome.succeeded, vec![2]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].item, 1);
    assert!(outcome.failed[0].reason.contains("matches 2 purposes"));

    let txs = list_transactions(&conn, &TransactionFilter::default()).unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].category.main, Some(grants));
}
