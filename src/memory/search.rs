//! Query path: per-sector exhaustive scan, waypoint expansion, fused scoring,
//! and the reinforcement applied to whatever a query returns.
//!
//! Query embedding is async and lives in the engine; everything here is
//! synchronous and runs against one connection.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::tables;
use crate::error::Result;
use crate::memory::maintenance::current_salience;
use crate::memory::sector::{fused_score, recency_score, Classification, MAX_SALIENCE, SALIENCE_BOOST};
use crate::memory::types::Sector;
use crate::memory::vector::cosine_similarity;
use crate::memory::waypoints::{self, Expansion};

// ── Public types ──────────────────────────────────────────────────────────────

/// Optional caller filters for a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    /// Restrict candidate sectors to these.
    #[serde(default)]
    pub sectors: Option<Vec<Sector>>,
    /// Drop memories whose stored salience is below this.
    #[serde(default)]
    pub min_salience: Option<f64>,
}

/// One ranked query hit.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub id: String,
    pub content: String,
    pub score: f64,
    /// Query sectors this memory has vectors in.
    pub sectors: Vec<Sector>,
    pub primary_sector: Sector,
    /// Traversal path from a direct hit; `[id]` when matched directly.
    pub path: Vec<String>,
    /// Decayed salience at query time.
    pub salience: f64,
    pub last_seen_at: DateTime<Utc>,
}

// ── Candidate selection ───────────────────────────────────────────────────────

/// Sectors to search for a classified query.
///
/// Pattern-free queries search every sector. The caller filter is applied
/// afterwards; an empty intersection falls back to semantic.
pub fn query_sectors(classification: &Classification, filter: Option<&[Sector]>) -> Vec<Sector> {
    let candidates = if classification.matched {
        classification.sectors()
    } else {
        Sector::ALL.to_vec()
    };

    let selected: Vec<Sector> = match filter {
        Some(allowed) => candidates
            .into_iter()
            .filter(|s| allowed.contains(s))
            .collect(),
        None => candidates,
    };

    if selected.is_empty() {
        vec![Sector::Semantic]
    } else {
        selected
    }
}

/// Score every stored vector in `sector` against `query`, best `k` first.
pub fn scan_sector(
    conn: &Connection,
    sector: Sector,
    query: &[f32],
    k: usize,
) -> Result<Vec<(String, f64)>> {
    let mut scored: Vec<(String, f64)> = tables::vectors_by_sector(conn, sector)?
        .into_iter()
        .map(|row| {
            let sim = cosine_similarity(query, &row.vector);
            (row.id, sim)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    Ok(scored)
}

// ── Assembly ──────────────────────────────────────────────────────────────────

/// Scan, expand, score, and rank. `query_vectors` holds one embedding per
/// searched sector. Read-only; see [`apply_reinforcement`] for side effects.
pub fn assemble_results(
    conn: &Connection,
    query_vectors: &[(Sector, Vec<f32>)],
    k: usize,
    filters: &QueryFilters,
    now: &DateTime<Utc>,
) -> Result<Vec<QueryResult>> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut direct: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for (sector, vector) in query_vectors {
        for (id, _) in scan_sector(conn, *sector, vector, k)? {
            if seen.insert(id.clone()) {
                direct.push(id);
            }
        }
    }

    let expansions = waypoints::expand_via_waypoints(conn, &direct, k * 2)?;
    let expanded: HashMap<&str, &Expansion> =
        expansions.iter().map(|e| (e.id.as_str(), e)).collect();

    let candidates = direct
        .iter()
        .map(String::as_str)
        .chain(expansions.iter().map(|e| e.id.as_str()));

    let mut results = Vec::new();
    for id in candidates {
        match score_candidate(conn, id, expanded.get(id).copied(), query_vectors, filters, now) {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(id, error = %e, "dropping query candidate");
            }
        }
    }

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(k);
    Ok(results)
}

fn score_candidate(
    conn: &Connection,
    id: &str,
    expansion: Option<&Expansion>,
    query_vectors: &[(Sector, Vec<f32>)],
    filters: &QueryFilters,
    now: &DateTime<Utc>,
) -> Result<Option<QueryResult>> {
    // synthetic sector nodes and deleted memories have no row
    let Some(memory) = tables::get_memory(conn, id)? else {
        return Ok(None);
    };
    if filters.min_salience.is_some_and(|min| memory.salience < min) {
        return Ok(None);
    }

    let mut best_similarity = 0.0f64;
    let mut sectors = Vec::new();
    for row in tables::vectors_by_memory(conn, id)? {
        if let Some((_, q)) = query_vectors.iter().find(|(s, _)| *s == row.sector) {
            best_similarity = best_similarity.max(cosine_similarity(q, &row.vector));
            sectors.push(row.sector);
        }
    }

    let waypoint_weight = expansion.map_or(0.0, |e| e.weight);
    let salience = current_salience(&memory, now);
    let recency = recency_score(memory.last_seen_at, *now);

    Ok(Some(QueryResult {
        score: fused_score(best_similarity, salience, recency, waypoint_weight),
        path: expansion.map_or_else(|| vec![memory.id.clone()], |e| e.path.clone()),
        id: memory.id,
        content: memory.content,
        sectors,
        primary_sector: memory.primary_sector,
        salience,
        last_seen_at: memory.last_seen_at,
    }))
}

// ── Reinforcement ─────────────────────────────────────────────────────────────

/// Touch every returned memory and strengthen the edges of multi-hop paths.
/// One transaction.
///
/// The boost lands on the salience decayed up to `now`, the value the result
/// reports, since `last_seen_at` restarts the decay clock.
pub fn apply_reinforcement(
    conn: &mut Connection,
    results: &[QueryResult],
    now: &DateTime<Utc>,
) -> Result<()> {
    let tx = conn.transaction()?;
    for result in results {
        let Some(memory) = tables::get_memory(&tx, &result.id)? else {
            continue;
        };
        let boosted = (current_salience(&memory, now) + SALIENCE_BOOST).min(MAX_SALIENCE);
        tables::update_seen(&tx, &result.id, boosted, now)?;
        if result.path.len() > 1 {
            waypoints::reinforce_waypoints(&tx, &result.path, now)?;
        }
    }
    tx.commit()?;
    Ok(())
}
