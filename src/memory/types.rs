//! Core memory type definitions.
//!
//! Defines [`Sector`] (the five semantic categories), [`Memory`] (a full record),
//! [`VectorRow`], [`Waypoint`] (associative graph edges), and [`EmbedLog`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five semantic sectors content is classified into and embedded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    /// Events and personal experiences anchored in time.
    Episodic,
    /// Facts, definitions, and general knowledge.
    Semantic,
    /// Steps, instructions, and how-to content.
    Procedural,
    /// Feelings and affect.
    Emotional,
    /// Insight, lessons, and meta-cognition.
    Reflective,
}

impl Sector {
    /// Registry order.
    pub const ALL: [Sector; 5] = [
        Self::Episodic,
        Self::Semantic,
        Self::Procedural,
        Self::Emotional,
        Self::Reflective,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
            Self::Emotional => "emotional",
            Self::Reflective => "reflective",
        }
    }
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(Self::Episodic),
            "semantic" => Ok(Self::Semantic),
            "procedural" => Ok(Self::Procedural),
            "emotional" => Ok(Self::Emotional),
            "reflective" => Ok(Self::Reflective),
            _ => Err(format!("unknown sector: {s}")),
        }
    }
}

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub content: String,
    pub primary_sector: Sector,
    pub tags: Vec<String>,
    /// Opaque caller document; never interpreted by the engine.
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Current strength in `[0.0, 1.0]`.
    pub salience: f64,
    /// Decay rate per day, copied from the primary sector at creation.
    pub decay_lambda: f64,
    pub version: i64,
    /// Dimension of the stored mean vector, if one was computed.
    pub mean_dim: Option<usize>,
    #[serde(skip)]
    pub mean_vec: Option<Vec<u8>>,
}

/// One per-sector embedding of a memory.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub id: String,
    pub sector: Sector,
    pub vector: Vec<f32>,
    pub dim: usize,
}

/// A directed, weighted edge between two node ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    pub src_id: String,
    pub dst_id: String,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedStatus {
    Pending,
    Completed,
    Failed,
}

impl EmbedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EmbedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown embed status: {s}")),
        }
    }
}

/// Audit record for one embedding attempt sequence.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedLog {
    pub id: String,
    pub model: String,
    pub status: EmbedStatus,
    pub ts: DateTime<Utc>,
    pub err: Option<String>,
}
