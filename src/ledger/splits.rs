// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Splitting one transaction into categorized parts.
//!
//! A transaction is either unsplit (its own category triple classifies it) or
//! split (its triple and payer/payee are cleared and the parts carry the
//! classification). Applying a split archives what was cleared so that
//! [`remove_split`] can put it back. Both directions are a single write.

use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::budgets::refresh_year;
use super::store::{get_transaction, has_splits, splits_for};
use super::taxonomy::Taxonomy;
use super::{with_snapshot, with_write};
use crate::errors::{LedgerError, Result, retry_on_conflict};
use crate::models::{CategoryTriple, PurposeLevel, Transaction, TransactionSplit};
use crate::permissions::{Capabilities, Operation, ensure};
use crate::utils::money;

/// Largest difference between the parts and the parent total that still
/// counts as balanced.
pub const SPLIT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub const MIN_SPLIT_PARTS: usize = 2;

/// Purpose picked for one part, either through the main → business →
/// specific cascade or through the flat selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurposeSelection {
    pub main: Option<i64>,
    pub business: Option<i64>,
    pub specific: Option<i64>,
    pub fallback: Option<i64>,
}

impl PurposeSelection {
    pub fn cascade(main: i64, business: i64, specific: i64) -> Self {
        PurposeSelection {
            main: Some(main),
            business: Some(business),
            specific: Some(specific),
            fallback: None,
        }
    }

    pub fn flat(purpose_id: i64) -> Self {
        PurposeSelection {
            fallback: Some(purpose_id),
            ..Default::default()
        }
    }

    /// Picking a main purpose invalidates anything chosen below it.
    pub fn choose_main(&mut self, id: i64) {
        self.main = Some(id);
        self.business = None;
        self.specific = None;
    }

    pub fn choose_business(&mut self, id: i64) {
        self.business = Some(id);
        self.specific = None;
    }

    pub fn choose_specific(&mut self, id: i64) {
        self.specific = Some(id);
    }

    pub fn choose_fallback(&mut self, id: i64) {
        self.fallback = Some(id);
    }

    pub fn is_cascade_complete(&self) -> bool {
        self.main.is_some() && self.business.is_some() && self.specific.is_some()
    }

    fn deepest_cascade(&self) -> Option<i64> {
        self.specific.or(self.business).or(self.main)
    }

    /// A complete cascade wins; otherwise the flat selector; otherwise the
    /// deepest level of a partial cascade.
    pub fn resolve(&self, taxonomy: &Taxonomy) -> Result<i64> {
        if self.is_cascade_complete() {
            self.check_cascade(taxonomy)?;
            return self
                .specific
                .ok_or_else(|| LedgerError::validation("cascade has no specific purpose"));
        }
        if let Some(id) = self.fallback {
            taxonomy.node(id)?;
            return Ok(id);
        }
        match self.deepest_cascade() {
            Some(id) => {
                self.check_cascade(taxonomy)?;
                Ok(id)
            }
            None => Err(LedgerError::validation("no purpose selected")),
        }
    }

    fn check_cascade(&self, taxonomy: &Taxonomy) -> Result<()> {
        let levels = [
            (self.main, PurposeLevel::Main),
            (self.business, PurposeLevel::Business),
            (self.specific, PurposeLevel::Specific),
        ];
        let mut above: Option<i64> = None;
        for (chosen, level) in levels {
            let Some(id) = chosen else {
                above = None;
                continue;
            };
            let node = taxonomy.node(id)?;
            if node.level != level {
                return Err(LedgerError::validation(format!(
                    "purpose '{}' is {}, selected as {}",
                    node.name, node.level, level
                )));
            }
            if let Some(parent) = above {
                if node.parent_id != Some(parent) {
                    return Err(LedgerError::validation(format!(
                        "purpose '{}' is not under the selected {}",
                        node.name,
                        level.parent_level().unwrap_or(PurposeLevel::Main)
                    )));
                }
            }
            above = Some(id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitLine {
    pub amount: Decimal,
    pub selection: PurposeSelection,
    #[serde(default)]
    pub description: Option<String>,
}

impl SplitLine {
    pub fn new(amount: Decimal, selection: PurposeSelection) -> Self {
        SplitLine {
            amount,
            selection,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Replace-the-split command. `expected_version` pins the parent version the
/// caller last saw; a mismatch is reported as a conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitCommand {
    pub transaction_id: i64,
    #[serde(default)]
    pub expected_version: Option<i64>,
    pub lines: Vec<SplitLine>,
}

impl SplitCommand {
    pub fn new(transaction_id: i64, lines: Vec<SplitLine>) -> Self {
        SplitCommand {
            transaction_id,
            expected_version: None,
            lines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSplit {
    pub split_index: i64,
    pub amount: Decimal,
    pub purpose_id: i64,
    pub category: CategoryTriple,
    pub description: Option<String>,
}

/// Running totals shown while a split is being edited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitProgress {
    pub expected: Decimal,
    pub allocated: Decimal,
    pub remaining: Decimal,
    pub balanced: bool,
}

pub fn split_progress(tx: &Transaction, lines: &[SplitLine]) -> SplitProgress {
    let expected = tx.total();
    let allocated: Decimal = lines.iter().map(|l| money(l.amount)).sum();
    let remaining = expected - allocated;
    SplitProgress {
        expected,
        allocated,
        remaining,
        balanced: remaining.abs() <= SPLIT_TOLERANCE,
    }
}

/// Checks a proposed split without writing anything.
pub fn validate_split(
    tx: &Transaction,
    lines: &[SplitLine],
    taxonomy: &Taxonomy,
) -> Result<Vec<ResolvedSplit>> {
    if lines.len() < MIN_SPLIT_PARTS {
        return Err(LedgerError::validation(format!(
            "a split needs at least {} parts, got {}",
            MIN_SPLIT_PARTS,
            lines.len()
        )));
    }
    let mut resolved = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let split_index = i as i64 + 1;
        if line.amount < Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "part {} has a negative amount",
                split_index
            )));
        }
        let purpose_id = line.selection.resolve(taxonomy).map_err(|err| match err {
            LedgerError::Validation(msg) => {
                LedgerError::Validation(format!("part {}: {}", split_index, msg))
            }
            other => other,
        })?;
        let category = taxonomy.derive_ancestors(purpose_id)?;
        resolved.push(ResolvedSplit {
            split_index,
            amount: money(line.amount),
            purpose_id,
            category,
            description: line
                .description
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        });
    }
    let progress = split_progress(tx, lines);
    if !progress.balanced {
        return Err(LedgerError::AmountMismatch {
            expected: progress.expected,
            actual: progress.allocated,
        });
    }
    Ok(resolved)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SplitState {
    Unsplit,
    Split(Vec<TransactionSplit>),
}

impl SplitState {
    pub fn is_split(&self) -> bool {
        matches!(self, SplitState::Split(_))
    }
}

pub fn split_state(conn: &Connection, transaction_id: i64) -> Result<SplitState> {
    with_snapshot(conn, |conn| {
        get_transaction(conn, transaction_id)?;
        let parts = splits_for(conn, transaction_id)?;
        Ok(if parts.is_empty() {
            SplitState::Unsplit
        } else {
            SplitState::Split(parts)
        })
    })
}

pub fn list_splits(conn: &Connection, transaction_id: i64) -> Result<Vec<TransactionSplit>> {
    splits_for(conn, transaction_id)
}

/// Categorization a split transaction had before it was split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitArchive {
    pub transaction_id: i64,
    pub payer_payee: Option<String>,
    pub category: CategoryTriple,
    pub archived_at: String,
}

pub fn archived_categorization(
    conn: &Connection,
    transaction_id: i64,
) -> Result<Option<SplitArchive>> {
    let archive = conn
        .query_row(
            "SELECT transaction_id, payer_payee, main_purpose_id, business_purpose_id, specific_purpose_id, archived_at
             FROM split_archives WHERE transaction_id=?1",
            params![transaction_id],
            |r| {
                Ok(SplitArchive {
                    transaction_id: r.get(0)?,
                    payer_payee: r.get(1)?,
                    category: CategoryTriple {
                        main: r.get(2)?,
                        business: r.get(3)?,
                        specific: r.get(4)?,
                    },
                    archived_at: r.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(archive)
}

/// Replaces the parts of a transaction and clears its own categorization, as
/// one write. Nothing is written when validation fails.
pub fn apply_split(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    cmd: &SplitCommand,
) -> Result<Vec<TransactionSplit>> {
    ensure(caps, Operation::SplitTransactions)?;
    retry_on_conflict(|| apply_split_once(conn, cmd))
}

fn apply_split_once(conn: &mut Connection, cmd: &SplitCommand) -> Result<Vec<TransactionSplit>> {
    let id = cmd.transaction_id;
    with_write(conn, |db| {
        let parent = get_transaction(db, id)?;
        if let Some(expected) = cmd.expected_version {
            if expected != parent.version {
                return Err(LedgerError::ConcurrencyConflict {
                    entity: "transaction",
                    id,
                });
            }
        }
        let taxonomy = Taxonomy::load(db)?;
        let resolved = validate_split(&parent, &cmd.lines, &taxonomy)?;

        // Re-splitting keeps the archive from the first split; the parent's
        // fields are already cleared by then.
        if !has_splits(db, id)? {
            db.execute(
                "INSERT OR REPLACE INTO split_archives(transaction_id, payer_payee, main_purpose_id, business_purpose_id, specific_purpose_id, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
                params![
                    id,
                    parent.payer_payee,
                    parent.category.main,
                    parent.category.business,
                    parent.category.specific,
                ],
            )?;
        }
        db.execute(
            "DELETE FROM transaction_splits WHERE transaction_id=?1",
            params![id],
        )?;
        {
            let mut ins = db.prepare_cached(
                "INSERT INTO transaction_splits(transaction_id, split_index, amount, main_purpose_id, business_purpose_id, specific_purpose_id, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for part in &resolved {
                ins.execute(params![
                    id,
                    part.split_index,
                    part.amount.to_string(),
                    part.category.main,
                    part.category.business,
                    part.category.specific,
                    part.description,
                ])?;
            }
        }
        let n = db.execute(
            "UPDATE transactions SET payer_payee=NULL, main_purpose_id=NULL, business_purpose_id=NULL, specific_purpose_id=NULL, version=version+1
             WHERE id=?1 AND version=?2",
            params![id, parent.version],
        )?;
        if n == 0 {
            return Err(LedgerError::ConcurrencyConflict {
                entity: "transaction",
                id,
            });
        }
        refresh_year(db, parent.audit_year)?;
        tracing::info!(transaction_id = id, parts = resolved.len(), "split applied");
        splits_for(db, id)
    })
}

/// Drops the parts and restores the categorization archived when the split
/// was first applied.
pub fn remove_split(
    conn: &mut Connection,
    caps: &dyn Capabilities,
    transaction_id: i64,
) -> Result<Transaction> {
    ensure(caps, Operation::SplitTransactions)?;
    retry_on_conflict(|| remove_split_once(conn, transaction_id))
}

fn remove_split_once(conn: &mut Connection, id: i64) -> Result<Transaction> {
    with_write(conn, |db| {
        let parent = get_transaction(db, id)?;
        if !has_splits(db, id)? {
            return Err(LedgerError::validation(format!(
                "transaction {} is not split",
                id
            )));
        }
        let archive = archived_categorization(db, id)?;
        if archive.is_none() {
            tracing::warn!(transaction_id = id, "no archived categorization; leaving fields empty");
        }
        let (payer, category) = archive
            .map(|a| (a.payer_payee, a.category))
            .unwrap_or_default();

        db.execute(
            "DELETE FROM transaction_splits WHERE transaction_id=?1",
            params![id],
        )?;
        db.execute(
            "DELETE FROM split_archives WHERE transaction_id=?1",
            params![id],
        )?;
        let n = db.execute(
            "UPDATE transactions SET payer_payee=?1, main_purpose_id=?2, business_purpose_id=?3, specific_purpose_id=?4, version=version+1
             WHERE id=?5 AND version=?6",
            params![
                payer,
                category.main,
                category.business,
                category.specific,
                id,
                parent.version
            ],
        )?;
        if n == 0 {
            return Err(LedgerError::ConcurrencyConflict {
                entity: "transaction",
                id,
            });
        }
        refresh_year(db, parent.audit_year)?;
        tracing::info!(transaction_id = id, "split removed, categorization restored");
        get_transaction(db, id)
    })
}
