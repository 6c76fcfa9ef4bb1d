//! Salience decay and manual reinforcement.
//!
//! Each memory decays with its own λ from the later of `last_seen_at` and
//! `updated_at`. A sweep persists the decayed value and bumps `updated_at`, so
//! the next sweep measures elapsed time from there and never decays the same
//! interval twice.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::tables;
use crate::error::{HsgError, Result};
use crate::memory::sector::{days_between, decay_with_lambda, MAX_SALIENCE};
use crate::memory::types::Memory;

/// Changes smaller than this are not written back.
const DECAY_EPSILON: f64 = 1e-6;

/// Result of [`decay_sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecayStats {
    pub processed: usize,
    pub decayed: usize,
}

/// Result of [`reinforce_memory`].
#[derive(Debug, Clone, Serialize)]
pub struct ReinforceResult {
    pub id: String,
    pub previous_salience: f64,
    pub salience: f64,
}

/// Salience of `memory` decayed up to `now`.
pub fn current_salience(memory: &Memory, now: &DateTime<Utc>) -> f64 {
    let since = memory.last_seen_at.max(memory.updated_at);
    decay_with_lambda(memory.decay_lambda, memory.salience, days_between(since, *now))
}

/// Recompute and persist every memory's salience. One transaction.
pub fn decay_sweep(conn: &mut Connection, now: &DateTime<Utc>) -> Result<DecayStats> {
    let tx = conn.transaction()?;
    let mut stats = DecayStats::default();

    for memory in tables::all_memories(&tx)? {
        stats.processed += 1;
        let decayed = current_salience(&memory, now);
        if (memory.salience - decayed).abs() > DECAY_EPSILON {
            tables::update_salience(&tx, &memory.id, decayed, now)?;
            stats.decayed += 1;
        }
    }

    tx.commit()?;
    tracing::info!(processed = stats.processed, decayed = stats.decayed, "decay sweep complete");
    Ok(stats)
}

/// Raise a memory's decayed salience by `boost` (capped at 1.0) and mark it seen.
///
/// `previous_salience` is the value decayed up to `now`.
pub fn reinforce_memory(
    conn: &mut Connection,
    id: &str,
    boost: f64,
    now: &DateTime<Utc>,
) -> Result<ReinforceResult> {
    if !boost.is_finite() || boost < 0.0 {
        return Err(HsgError::InvalidInput(format!("boost must be a non-negative number, got {boost}")));
    }

    let tx = conn.transaction()?;
    let memory = tables::get_memory(&tx, id)?
        .ok_or_else(|| HsgError::NotFound(id.to_string()))?;

    let previous = current_salience(&memory, now);
    let salience = (previous + boost).min(MAX_SALIENCE);
    tables::update_seen(&tx, id, salience, now)?;
    tx.commit()?;

    tracing::debug!(id, from = previous, to = salience, "memory reinforced");
    Ok(ReinforceResult {
        id: id.to_string(),
        previous_salience: previous,
        salience,
    })
}
