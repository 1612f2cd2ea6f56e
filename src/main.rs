// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use chapterledger::{cli, commands, db, utils};

fn main() -> Result<()> {
    utils::init_tracing();
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let mut conn = db::open_or_init()?;
    let caps = utils::session_capabilities(&conn)?;
    let caps = caps.as_ref();

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("account", sub)) => commands::accounts::handle(&conn, caps, sub)?,
        Some(("purpose", sub)) => commands::purposes::handle(&conn, caps, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&mut conn, caps, sub)?,
        Some(("split", sub)) => commands::splits::handle(&mut conn, caps, sub)?,
        Some(("balance", sub)) => commands::balances::handle(&conn, sub)?,
        Some(("budget", sub)) => commands::budgets::handle(&mut conn, caps, sub)?,
        Some(("project", sub)) => commands::projects::handle(&mut conn, caps, sub)?,
        Some(("report", sub)) => commands::reports::handle(&conn, sub)?,
        Some(("import", sub)) => commands::importer::handle(&mut conn, caps, sub)?,
        Some(("export", sub)) => commands::exporter::handle(&conn, sub)?,
        Some(("config", sub)) => commands::config::handle(&conn, sub)?,
        Some(("doctor", _)) => commands::doctor::handle(&conn)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
