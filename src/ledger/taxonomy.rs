// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The three-level purpose tree (main → business → specific).
//!
//! [`Taxonomy`] is an in-memory snapshot of every purpose row. All lookups run
//! against the snapshot so a caller sees one consistent tree even while other
//! clients edit purposes.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::errors::{LedgerError, Result};
use crate::models::{CategoryTriple, Placement, PurposeLevel, PurposeNode};
use crate::permissions::{Capabilities, Operation, ensure};

pub const UNCATEGORIZED: &str = "(uncategorized)";

#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    nodes: BTreeMap<i64, PurposeNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurposeTree {
    pub id: i64,
    pub name: String,
    pub level: PurposeLevel,
    pub children: Vec<PurposeTree>,
}

impl Taxonomy {
    pub fn from_nodes(nodes: impl IntoIterator<Item = PurposeNode>) -> Self {
        Taxonomy {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
        }
    }

    pub fn load(conn: &Connection) -> Result<Self> {
        Ok(Self::from_nodes(list_purposes(conn)?))
    }

    pub fn get(&self, id: i64) -> Option<&PurposeNode> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: i64) -> Result<&PurposeNode> {
        self.get(id)
            .ok_or_else(|| LedgerError::not_found("purpose", id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PurposeNode> {
        self.nodes.values()
    }

    /// Nodes from `id` up to its root, leaf first.
    fn ancestry(&self, id: i64) -> Result<Vec<&PurposeNode>> {
        let mut chain = Vec::with_capacity(3);
        let mut seen = HashSet::new();
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            if !seen.insert(cur) {
                return Err(LedgerError::CycleDetected(cur));
            }
            let node = self.node(cur)?;
            chain.push(node);
            cursor = node.parent_id;
        }
        Ok(chain)
    }

    /// Names from the root down to `id`.
    pub fn resolve_path(&self, id: i64) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .ancestry(id)?
            .into_iter()
            .map(|n| n.name.clone())
            .collect();
        names.reverse();
        Ok(names)
    }

    /// Human label for a purpose reference; dangling or empty references read
    /// as uncategorized instead of failing.
    pub fn display_path(&self, id: Option<i64>) -> String {
        match id.map(|id| self.resolve_path(id)) {
            Some(Ok(path)) => path.join(" > "),
            _ => UNCATEGORIZED.to_string(),
        }
    }

    /// Active nodes of `level` directly under `parent_id` (roots when `None`).
    pub fn children(&self, parent_id: Option<i64>, level: PurposeLevel) -> Vec<&PurposeNode> {
        let mut out: Vec<&PurposeNode> = self
            .nodes
            .values()
            .filter(|n| n.is_active && n.level == level && n.parent_id == parent_id)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    /// Selectable tree. A main purpose with no active specific purpose below
    /// it offers nothing to pick, so it is left out.
    pub fn build_tree(&self) -> Vec<PurposeTree> {
        let mut roots = Vec::new();
        for main in self.children(None, PurposeLevel::Main) {
            let mut businesses = Vec::new();
            let mut has_leaf = false;
            for business in self.children(Some(main.id), PurposeLevel::Business) {
                let specifics: Vec<PurposeTree> = self
                    .children(Some(business.id), PurposeLevel::Specific)
                    .into_iter()
                    .map(|s| PurposeTree {
                        id: s.id,
                        name: s.name.clone(),
                        level: s.level,
                        children: Vec::new(),
                    })
                    .collect();
                has_leaf |= !specifics.is_empty();
                businesses.push(PurposeTree {
                    id: business.id,
                    name: business.name.clone(),
                    level: business.level,
                    children: specifics,
                });
            }
            if has_leaf {
                roots.push(PurposeTree {
                    id: main.id,
                    name: main.name.clone(),
                    level: main.level,
                    children: businesses,
                });
            }
        }
        roots
    }

    /// Rebuilds the full category triple for a stored purpose id.
    pub fn derive_ancestors(&self, id: i64) -> Result<CategoryTriple> {
        let mut triple = CategoryTriple::default();
        for node in self.ancestry(id)? {
            let slot = match node.level {
                PurposeLevel::Main => &mut triple.main,
                PurposeLevel::Business => &mut triple.business,
                PurposeLevel::Specific => &mut triple.specific,
            };
            if slot.is_some() {
                return Err(LedgerError::Corrupt(format!(
                    "purpose {} has two {} ancestors",
                    id, node.level
                )));
            }
            *slot = Some(node.id);
        }
        Ok(triple)
    }

    /// `id` and every purpose below it, inactive ones included.
    pub fn subtree(&self, id: i64) -> BTreeSet<i64> {
        let mut out = BTreeSet::new();
        if !self.nodes.contains_key(&id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if !out.insert(cur) {
                continue;
            }
            stack.extend(
                self.nodes
                    .values()
                    .filter(|n| n.parent_id == Some(cur))
                    .map(|n| n.id),
            );
        }
        out
    }

    /// True when `id` equals `ancestor` or sits anywhere below it.
    pub fn is_within(&self, id: i64, ancestor: i64) -> bool {
        match self.ancestry(id) {
            Ok(chain) => chain.iter().any(|n| n.id == ancestor),
            Err(_) => false,
        }
    }
}

fn node_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<PurposeNode> {
    let level: i64 = r.get(2)?;
    let level = PurposeLevel::from_i64(level).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Integer,
            format!("purpose level {} out of range", level).into(),
        )
    })?;
    Ok(PurposeNode {
        id: r.get(0)?,
        name: r.get(1)?,
        level,
        parent_id: r.get(3)?,
        is_active: r.get(4)?,
    })
}

pub fn list_purposes(conn: &Connection) -> Result<Vec<PurposeNode>> {
    let mut stmt = conn
        .prepare("SELECT id, name, level, parent_id, is_active FROM purposes ORDER BY level, name, id")?;
    let rows = stmt.query_map([], node_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get_purpose(conn: &Connection, id: i64) -> Result<PurposeNode> {
    conn.query_row(
        "SELECT id, name, level, parent_id, is_active FROM purposes WHERE id=?1",
        params![id],
        node_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => LedgerError::not_found("purpose", id),
        other => other.into(),
    })
}

/// Adds a purpose. The parent must exist, be active, and sit exactly one
/// level above, which also keeps parent chains acyclic.
pub fn create_purpose(
    conn: &Connection,
    caps: &dyn Capabilities,
    name: &str,
    placement: Placement,
) -> Result<PurposeNode> {
    ensure(caps, Operation::ManagePurposes)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("purpose name is required"));
    }
    let level = placement.level();
    if let Some(parent_id) = placement.parent_id() {
        let parent = get_purpose(conn, parent_id)?;
        if Some(parent.level) != level.parent_level() {
            return Err(LedgerError::validation(format!(
                "a {} purpose needs a {} parent, but '{}' is {}",
                level,
                level.parent_level().map(|l| l.to_string()).unwrap_or_default(),
                parent.name,
                parent.level
            )));
        }
        if !parent.is_active {
            return Err(LedgerError::validation(format!(
                "parent purpose '{}' is inactive",
                parent.name
            )));
        }
    }
    conn.execute(
        "INSERT INTO purposes(name, level, parent_id) VALUES (?1, ?2, ?3)",
        params![name, level.as_i64(), placement.parent_id()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(purpose_id = id, %level, name, "purpose created");
    get_purpose(conn, id)
}

pub fn rename_purpose(
    conn: &Connection,
    caps: &dyn Capabilities,
    id: i64,
    name: &str,
) -> Result<()> {
    ensure(caps, Operation::ManagePurposes)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("purpose name is required"));
    }
    let n = conn.execute("UPDATE purposes SET name=?1 WHERE id=?2", params![name, id])?;
    if n == 0 {
        return Err(LedgerError::not_found("purpose", id));
    }
    Ok(())
}

/// Deactivating hides a purpose from selection; existing references keep
/// resolving.
pub fn set_purpose_active(
    conn: &Connection,
    caps: &dyn Capabilities,
    id: i64,
    active: bool,
) -> Result<()> {
    ensure(caps, Operation::ManagePurposes)?;
    let n = conn.execute(
        "UPDATE purposes SET is_active=?1 WHERE id=?2",
        params![active, id],
    )?;
    if n == 0 {
        return Err(LedgerError::not_found("purpose", id));
    }
    tracing::info!(purpose_id = id, active, "purpose activity changed");
    Ok(())
}
