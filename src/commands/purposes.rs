// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::taxonomy::{
    PurposeTree, Taxonomy, create_purpose, list_purposes, rename_purpose, set_purpose_active,
};
use crate::models::Placement;
use crate::permissions::Capabilities;
use crate::utils::{maybe_print_json, pretty_table, required};
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use serde::Serialize;

pub fn handle(conn: &Connection, caps: &dyn Capabilities, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, caps, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("tree", sub)) => tree(conn, sub)?,
        Some(("path", sub)) => {
            let id = *required::<i64>(sub, "id")?;
            let path = Taxonomy::load(conn)?.resolve_path(id)?;
            println!("{}", path.join(" > "));
        }
        Some(("rename", sub)) => {
            let id = *required::<i64>(sub, "id")?;
            let name = required::<String>(sub, "name")?;
            rename_purpose(conn, caps, id, name)?;
            println!("Renamed purpose {} to '{}'", id, name.trim());
        }
        Some(("deactivate", sub)) => {
            let id = *required::<i64>(sub, "id")?;
            set_purpose_active(conn, caps, id, false)?;
            println!("Deactivated purpose {}", id);
        }
        Some(("activate", sub)) => {
            let id = *required::<i64>(sub, "id")?;
            set_purpose_active(conn, caps, id, true)?;
            println!("Activated purpose {}", id);
        }
        _ => {}
    }
    Ok(())
}

/// Turns `--level` and `--parent` into a placement.
pub fn placement_from_args(level: &str, parent: Option<i64>) -> Result<Placement> {
    match (level, parent) {
        ("main", None) => Ok(Placement::Main),
        ("main", Some(_)) => Err(anyhow!("A main purpose cannot have a parent")),
        ("business", p) => Ok(Placement::Business {
            main_id: p.context("--parent <main purpose id> is required for a business purpose")?,
        }),
        ("specific", p) => Ok(Placement::Specific {
            business_id: p
                .context("--parent <business purpose id> is required for a specific purpose")?,
        }),
        (other, _) => Err(anyhow!("Unknown purpose level '{}'", other)),
    }
}

fn add(conn: &Connection, caps: &dyn Capabilities, sub: &clap::ArgMatches) -> Result<()> {
    let name = required::<String>(sub, "name")?;
    let level = required::<String>(sub, "level")?;
    let placement = placement_from_args(level, sub.get_one::<i64>("parent").copied())?;
    let node = create_purpose(conn, caps, name, placement)?;
    let path = Taxonomy::load(conn)?.display_path(Some(node.id));
    println!("Added {} purpose {} '{}'", node.level, node.id, path);
    Ok(())
}

#[derive(Serialize)]
pub struct PurposeRow {
    pub id: i64,
    pub level: String,
    pub path: String,
    pub active: bool,
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let nodes = list_purposes(conn)?;
    let taxonomy = Taxonomy::from_nodes(nodes.clone());
    let data: Vec<PurposeRow> = nodes
        .iter()
        .map(|n| PurposeRow {
            id: n.id,
            level: n.level.to_string(),
            path: taxonomy.display_path(Some(n.id)),
            active: n.is_active,
        })
        .collect();
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.level.clone(),
                    r.path.clone(),
                    if r.active { "yes".into() } else { "no".into() },
                ]
            })
            .collect();
        println!("{}", pretty_table(&["Id", "Level", "Path", "Active"], rows));
    }
    Ok(())
}

fn print_tree(nodes: &[PurposeTree], depth: usize) {
    for n in nodes {
        println!("{}{} [{}]", "  ".repeat(depth), n.name, n.id);
        print_tree(&n.children, depth + 1);
    }
}

fn tree(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let tree = Taxonomy::load(conn)?.build_tree();
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &tree)? {
        if tree.is_empty() {
            println!("No selectable purposes yet");
        }
        print_tree(&tree, 0);
    }
    Ok(())
}
