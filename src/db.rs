// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Chapterledger", "chapterledger"));

pub const DB_ENV: &str = "CHAPTERLEDGER_DB";

pub fn db_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        let p = p.trim();
        if !p.is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("chapterledger.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    let conn =
        Connection::open(&path).with_context(|| format!("Open DB at {}", path.display()))?;
    // Other clients may hold the write lock briefly; wait instead of failing at once.
    conn.busy_timeout(Duration::from_secs(5))?;
    init_schema(&conn)?;
    tracing::debug!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS bank_accounts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_name TEXT NOT NULL UNIQUE,
        account_type TEXT NOT NULL,
        initial_amount TEXT NOT NULL DEFAULT '0',
        revision INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- level 0 = main, 1 = business, 2 = specific
    CREATE TABLE IF NOT EXISTS purposes(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        level INTEGER NOT NULL CHECK(level IN (0,1,2)),
        parent_id INTEGER,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(parent_id) REFERENCES purposes(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_purposes_parent ON purposes(parent_id);

    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bank_account_id INTEGER NOT NULL,
        date TEXT NOT NULL,
        main_description TEXT NOT NULL,
        sub_description TEXT,
        income TEXT NOT NULL DEFAULT '0',
        expense TEXT NOT NULL DEFAULT '0',
        payer_payee TEXT,
        main_purpose_id INTEGER,
        business_purpose_id INTEGER,
        specific_purpose_id INTEGER,
        project_account TEXT,
        audit_year INTEGER NOT NULL,
        reference_no TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(bank_account_id) REFERENCES bank_accounts(id) ON DELETE CASCADE,
        FOREIGN KEY(main_purpose_id) REFERENCES purposes(id) ON DELETE SET NULL,
        FOREIGN KEY(business_purpose_id) REFERENCES purposes(id) ON DELETE SET NULL,
        FOREIGN KEY(specific_purpose_id) REFERENCES purposes(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_account_date ON transactions(bank_account_id, date);
    CREATE INDEX IF NOT EXISTS idx_transactions_audit_year ON transactions(audit_year);

    CREATE TABLE IF NOT EXISTS transaction_splits(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        transaction_id INTEGER NOT NULL,
        split_index INTEGER NOT NULL,
        amount TEXT NOT NULL,
        main_purpose_id INTEGER,
        business_purpose_id INTEGER,
        specific_purpose_id INTEGER,
        description TEXT,
        UNIQUE(transaction_id, split_index),
        FOREIGN KEY(transaction_id) REFERENCES transactions(id) ON DELETE CASCADE
    );

    -- categorization a transaction had before it was split
    CREATE TABLE IF NOT EXISTS split_archives(
        transaction_id INTEGER PRIMARY KEY,
        payer_payee TEXT,
        main_purpose_id INTEGER,
        business_purpose_id INTEGER,
        specific_purpose_id INTEGER,
        archived_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(transaction_id) REFERENCES transactions(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS budgets(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_name TEXT NOT NULL,
        budget_year INTEGER NOT NULL,
        total_budget TEXT NOT NULL,
        allocated_amount TEXT NOT NULL DEFAULT '0',
        spent_amount TEXT NOT NULL DEFAULT '0',
        remaining_amount TEXT NOT NULL DEFAULT '0',
        status TEXT NOT NULL DEFAULT 'draft' CHECK(status IN ('draft','active','closed')),
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(project_name, budget_year)
    );

    CREATE TABLE IF NOT EXISTS budget_allocations(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        budget_id INTEGER NOT NULL,
        purpose_id INTEGER NOT NULL,
        allocated_amount TEXT NOT NULL,
        spent_amount TEXT NOT NULL DEFAULT '0',
        remaining_amount TEXT NOT NULL DEFAULT '0',
        UNIQUE(budget_id, purpose_id),
        FOREIGN KEY(budget_id) REFERENCES budgets(id) ON DELETE CASCADE,
        FOREIGN KEY(purpose_id) REFERENCES purposes(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS project_accounts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        budget TEXT NOT NULL DEFAULT '0',
        status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','completed','cancelled')),
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS verification_requests(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        snapshot TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        requested_at TEXT NOT NULL,
        FOREIGN KEY(project_id) REFERENCES project_accounts(id) ON DELETE CASCADE
    );
    "#,
    )?;
    Ok(())
}
