//! Hierarchical sectored memory for AI agents.
//!
//! Every memory is classified into one of five sectors and embedded once per
//! relevant sector. Recall scans each sector exhaustively, expands the hits
//! along a weighted waypoint graph, and ranks everything with a fused score of
//! similarity, salience, recency and waypoint weight. Salience decays
//! exponentially per sector and is reinforced whenever a memory is recalled.
//!
//! | Sector | Holds | Decay λ / day |
//! |--------|-------|---------------|
//! | **Episodic** | events, experiences | 0.015 |
//! | **Semantic** | facts, definitions | 0.005 |
//! | **Procedural** | steps, how-to | 0.008 |
//! | **Emotional** | feelings, affect | 0.020 |
//! | **Reflective** | insight, lessons | 0.001 |
//!
//! # Modules
//!
//! - [`config`]: TOML + environment configuration
//! - [`db`]: SQLite schema, migrations, and row-level operations
//! - [`embedding`]: provider trait, five backends, and the multi-sector orchestrator
//! - [`memory`]: sector model, write and query paths, waypoint graph, decay, ingestion, agent graph memory
//! - [`engine`]: the async [`HsgEngine`] facade
//! - [`scheduler`]: recurring decay and prune tasks

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod memory;
pub mod scheduler;

pub use engine::HsgEngine;
pub use error::{HsgError, Result};
