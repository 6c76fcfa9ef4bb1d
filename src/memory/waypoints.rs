//! Waypoint graph engine: creation, weighted BFS expansion, reinforcement, pruning.
//!
//! Edges are keyed by `(src_id, dst_id)`; every creation path upserts on that pair.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::tables;
use crate::error::Result;
use crate::memory::types::Sector;
use crate::memory::vector::cosine_similarity;

/// Minimum cosine similarity for an automatic link.
pub const LINK_SIMILARITY_THRESHOLD: f64 = 0.75;
/// Weight given to symmetric inter-memory and cross-sector edges.
pub const PAIR_WEIGHT: f64 = 0.5;
pub const CONTEXTUAL_BASE_WEIGHT: f64 = 0.3;
const CONTEXTUAL_INCREMENT: f64 = 0.1;
pub const REINFORCE_BOOST: f64 = 0.05;
pub const PRUNE_THRESHOLD: f64 = 0.05;
/// Multiplier applied per hop during expansion.
const HOP_DECAY: f64 = 0.8;
const MIN_EXPANSION_WEIGHT: f64 = 0.1;
const MAX_WEIGHT: f64 = 1.0;

/// A node reached by [`expand_via_waypoints`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expansion {
    pub id: String,
    pub weight: f64,
    /// Seed first, this node last.
    pub path: Vec<String>,
}

/// Link `new_id` to the single most similar existing memory (by mean vector),
/// if that similarity reaches the threshold. Returns the chosen target.
pub fn create_single_waypoint(
    conn: &Connection,
    new_id: &str,
    mean: &[f32],
    now: &DateTime<Utc>,
) -> Result<Option<(String, f64)>> {
    let mut best: Option<(String, f64)> = None;
    for (id, other) in tables::memories_with_mean(conn)? {
        if id == new_id {
            continue;
        }
        let sim = cosine_similarity(mean, &other);
        if sim >= LINK_SIMILARITY_THRESHOLD && best.as_ref().map_or(true, |(_, b)| sim > *b) {
            best = Some((id, sim));
        }
    }

    if let Some((dst, sim)) = &best {
        tables::upsert_waypoint(conn, new_id, dst, *sim, now)?;
        tracing::debug!(src = new_id, dst = %dst, weight = sim, "created single waypoint");
    }
    Ok(best)
}

/// Bidirectional 0.5 edges between `new_id` and every same-sector memory whose
/// vector is similar enough. Returns the number of memories linked.
pub fn create_inter_memory_waypoints(
    conn: &Connection,
    new_id: &str,
    sector: Sector,
    vector: &[f32],
    now: &DateTime<Utc>,
) -> Result<usize> {
    let mut linked = 0;
    for row in tables::vectors_by_sector(conn, sector)? {
        if row.id == new_id {
            continue;
        }
        if cosine_similarity(vector, &row.vector) >= LINK_SIMILARITY_THRESHOLD {
            tables::upsert_waypoint(conn, new_id, &row.id, PAIR_WEIGHT, now)?;
            tables::upsert_waypoint(conn, &row.id, new_id, PAIR_WEIGHT, now)?;
            linked += 1;
        }
    }
    Ok(linked)
}

/// Synthetic per-sector node id.
pub fn sector_node(id: &str, sector: Sector) -> String {
    format!("{id}:{sector}")
}

/// Bidirectional 0.5 edges between `id` and its `id:sector` node for each sector.
pub fn create_cross_sector_waypoints(
    conn: &Connection,
    id: &str,
    sectors: &[Sector],
    now: &DateTime<Utc>,
) -> Result<usize> {
    for sector in sectors {
        let node = sector_node(id, *sector);
        tables::upsert_waypoint(conn, id, &node, PAIR_WEIGHT, now)?;
        tables::upsert_waypoint(conn, &node, id, PAIR_WEIGHT, now)?;
    }
    Ok(sectors.len())
}

/// Strengthen `id → related` edges by 0.1 (capped at 1.0), inserting missing ones at `base`.
pub fn create_contextual_waypoints(
    conn: &Connection,
    id: &str,
    related: &[String],
    base: f64,
    now: &DateTime<Utc>,
) -> Result<usize> {
    let mut touched = 0;
    for dst in related {
        if dst == id {
            continue;
        }
        match tables::get_waypoint(conn, id, dst)? {
            Some(existing) => {
                let weight = (existing.weight + CONTEXTUAL_INCREMENT).min(MAX_WEIGHT);
                tables::update_waypoint_weight(conn, id, dst, weight, now)?;
            }
            None => tables::upsert_waypoint(conn, id, dst, base, now)?,
        }
        touched += 1;
    }
    Ok(touched)
}

/// Breadth-first expansion from `seeds` along outgoing edges.
///
/// Each hop multiplies the carried weight by the edge weight and 0.8; nodes
/// below 0.1 are dropped. Seeds are never returned, no node is visited twice,
/// and at most `max_expansions` nodes come back.
pub fn expand_via_waypoints(
    conn: &Connection,
    seeds: &[String],
    max_expansions: usize,
) -> Result<Vec<Expansion>> {
    let mut visited: HashSet<String> = seeds.iter().cloned().collect();
    let mut frontier: VecDeque<(String, f64, Vec<String>)> = seeds
        .iter()
        .map(|s| (s.clone(), 1.0, vec![s.clone()]))
        .collect();
    let mut found = Vec::new();

    'outer: while let Some((node, weight, path)) = frontier.pop_front() {
        if found.len() >= max_expansions {
            break;
        }
        for edge in tables::outgoing_waypoints(conn, &node)? {
            let child_weight = weight * edge.weight * HOP_DECAY;
            if child_weight < MIN_EXPANSION_WEIGHT || visited.contains(&edge.dst_id) {
                continue;
            }
            visited.insert(edge.dst_id.clone());
            let mut child_path = path.clone();
            child_path.push(edge.dst_id.clone());
            found.push(Expansion {
                id: edge.dst_id.clone(),
                weight: child_weight,
                path: child_path.clone(),
            });
            frontier.push_back((edge.dst_id, child_weight, child_path));
            if found.len() >= max_expansions {
                break 'outer;
            }
        }
    }

    Ok(found)
}

/// Add 0.05 (capped at 1.0) to each existing edge along `path`. Missing edges are skipped.
pub fn reinforce_waypoints(conn: &Connection, path: &[String], now: &DateTime<Utc>) -> Result<usize> {
    let mut reinforced = 0;
    for pair in path.windows(2) {
        if let Some(edge) = tables::get_waypoint(conn, &pair[0], &pair[1])? {
            let weight = (edge.weight + REINFORCE_BOOST).min(MAX_WEIGHT);
            reinforced += tables::update_waypoint_weight(conn, &pair[0], &pair[1], weight, now)?;
        }
    }
    Ok(reinforced)
}

/// Delete every edge lighter than 0.05. Returns the number removed.
pub fn prune_weak_waypoints(conn: &Connection) -> Result<usize> {
    let pruned = tables::delete_waypoints_below(conn, PRUNE_THRESHOLD)?;
    tracing::info!(pruned, "pruned weak waypoints");
    Ok(pruned)
}
