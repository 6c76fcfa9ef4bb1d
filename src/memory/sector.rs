//! Sector model: the fixed registry of five sectors, rule-based classification,
//! and the decay / recency / fused-score math.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::types::Sector;

/// Upper bound for salience.
pub const MAX_SALIENCE: f64 = 1.0;
/// Salience added to a memory each time a query returns it.
pub const SALIENCE_BOOST: f64 = 0.1;

/// Weights for [`fused_score`].
const SIMILARITY_WEIGHT: f64 = 0.6;
const SALIENCE_WEIGHT: f64 = 0.2;
const RECENCY_WEIGHT: f64 = 0.1;
const WAYPOINT_WEIGHT: f64 = 0.1;

/// Additional sectors must reach this fraction of the primary score.
const ADDITIONAL_SECTOR_RATIO: f64 = 0.3;
const ZERO_SCORE_CONFIDENCE: f64 = 0.2;
const RECENCY_HALF_SCALE_DAYS: f64 = 30.0;

pub struct SectorConfig {
    pub sector: Sector,
    pub weight: f64,
    /// Exponential decay rate per day.
    pub decay_lambda: f64,
    pub patterns: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("sector pattern is a valid regex"))
        .collect()
}

static REGISTRY: LazyLock<Vec<SectorConfig>> = LazyLock::new(|| {
    vec![
        SectorConfig {
            sector: Sector::Episodic,
            weight: 1.2,
            decay_lambda: 0.015,
            patterns: compile(&[
                r"(?i)\b(today|yesterday|last\s+week|remember\s+when|that\s+time)\b",
                r"(?i)\b(I\s+(did|went|saw|met|felt))\b",
                r"(?i)\b(at\s+\d+:\d+|on\s+\w+day|in\s+\d{4})\b",
                r"(?i)\b(happened|occurred|experience|event|moment)\b",
            ]),
        },
        SectorConfig {
            sector: Sector::Semantic,
            weight: 1.0,
            decay_lambda: 0.005,
            patterns: compile(&[
                r"(?i)\b(define|definition|meaning|concept|theory)\b",
                r"(?i)\b(what\s+is|how\s+does|why\s+do|facts?\s+about)\b",
                r"(?i)\b(principle|rule|law|algorithm|method)\b",
                r"(?i)\b(knowledge|information|data|research|study)\b",
            ]),
        },
        SectorConfig {
            sector: Sector::Procedural,
            weight: 1.1,
            decay_lambda: 0.008,
            patterns: compile(&[
                r"(?i)\b(how\s+to|step\s+by\s+step|procedure|process)\b",
                r"(?i)\b(first|then|next|finally|afterwards)\b",
                r"(?i)\b(install|configure|setup|run|execute)\b",
                r"(?i)\b(tutorial|guide|instructions|manual)\b",
                r"(?i)\b(click|press|type|enter|select)\b",
            ]),
        },
        SectorConfig {
            sector: Sector::Emotional,
            weight: 1.3,
            decay_lambda: 0.020,
            patterns: compile(&[
                r"(?i)\b(feel|feeling|felt|emotion|mood)\b",
                r"(?i)\b(happy|sad|angry|excited|worried|anxious|calm)\b",
                r"(?i)\b(love|hate|like|dislike|enjoy|fear)\b",
                r"(?i)\b(amazing|terrible|wonderful|awful|fantastic|horrible)\b",
                r"[!]{2,}|[\?!]{2,}",
            ]),
        },
        SectorConfig {
            sector: Sector::Reflective,
            weight: 0.8,
            decay_lambda: 0.001,
            patterns: compile(&[
                r"(?i)\b(think|thinking|thought|reflect|reflection)\b",
                r"(?i)\b(realize|understand|insight|conclusion|lesson)\b",
                r"(?i)\b(why|purpose|meaning|significance|impact)\b",
                r"(?i)\b(philosophy|wisdom|belief|value|principle)\b",
                r"(?i)\b(should\s+have|could\s+have|if\s+only|what\s+if)\b",
            ]),
        },
    ]
});

/// All sector configs in registry order.
pub fn registry() -> &'static [SectorConfig] {
    &REGISTRY
}

pub fn sector_config(sector: Sector) -> &'static SectorConfig {
    // registry holds exactly one entry per variant, in `Sector::ALL` order
    &REGISTRY[sector as usize]
}

/// Outcome of classifying a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub primary: Sector,
    pub additional: Vec<Sector>,
    pub confidence: f64,
    /// Whether any pattern matched at all (false for pattern-free text).
    #[serde(skip)]
    pub matched: bool,
}

impl Classification {
    /// Primary followed by additional sectors.
    pub fn sectors(&self) -> Vec<Sector> {
        let mut out = Vec::with_capacity(1 + self.additional.len());
        out.push(self.primary);
        out.extend(self.additional.iter().copied());
        out
    }
}

/// Classify text into a primary sector plus any strongly co-occurring sectors.
///
/// An explicit sector short-circuits scoring with confidence 1.0.
pub fn classify_content(text: &str, explicit: Option<Sector>) -> Classification {
    if let Some(sector) = explicit {
        return Classification {
            primary: sector,
            additional: Vec::new(),
            confidence: 1.0,
            matched: true,
        };
    }

    let mut scores: Vec<(Sector, f64)> = registry()
        .iter()
        .map(|cfg| {
            let matches: usize = cfg.patterns.iter().map(|re| re.find_iter(text).count()).sum();
            (cfg.sector, matches as f64 * cfg.weight)
        })
        .collect();
    // stable sort keeps registry order among ties
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (top_sector, primary_score) = scores[0];
    if primary_score <= 0.0 {
        return Classification {
            primary: Sector::Semantic,
            additional: Vec::new(),
            confidence: ZERO_SCORE_CONFIDENCE,
            matched: false,
        };
    }

    let threshold = (primary_score * ADDITIONAL_SECTOR_RATIO).max(1.0);
    let additional = scores[1..]
        .iter()
        .filter(|(_, score)| *score > 0.0 && *score >= threshold)
        .map(|(sector, _)| *sector)
        .collect();
    let runner_up = scores[1].1;
    let confidence = (primary_score / (primary_score + runner_up + 1.0)).min(1.0);

    Classification {
        primary: top_sector,
        additional,
        confidence,
        matched: true,
    }
}

/// `max(0, s0 · e^(−λ·days))` with the sector's λ.
pub fn calculate_decay(sector: Sector, initial_salience: f64, days: f64) -> f64 {
    decay_with_lambda(sector_config(sector).decay_lambda, initial_salience, days)
}

/// Same as [`calculate_decay`] with an explicit λ (each memory keeps its own).
pub fn decay_with_lambda(lambda: f64, initial_salience: f64, days: f64) -> f64 {
    (initial_salience * (-lambda * days.max(0.0)).exp()).max(0.0)
}

/// `e^(−days_since/30)`; future timestamps count as zero days.
pub fn recency_score(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (-days_between(last_seen, now) / RECENCY_HALF_SCALE_DAYS).exp()
}

pub fn fused_score(similarity: f64, salience: f64, recency: f64, waypoint_weight: f64) -> f64 {
    SIMILARITY_WEIGHT * similarity
        + SALIENCE_WEIGHT * salience
        + RECENCY_WEIGHT * recency
        + WAYPOINT_WEIGHT * waypoint_weight
}

/// Fractional days from `from` to `to`, floored at zero.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let ms = (to - from).num_milliseconds().max(0) as f64;
    ms / 86_400_000.0
}

/// Initial salience for a new memory: 0.4 plus 0.1 per additional sector.
pub fn initial_salience(additional_sectors: usize) -> f64 {
    (0.4 + 0.1 * additional_sectors as f64).clamp(0.0, MAX_SALIENCE)
}
