pub mod chunking;
pub mod forget;
pub mod ingest;
pub mod langgraph;
pub mod maintenance;
pub mod search;
pub mod sector;
pub mod stats;
pub mod store;
pub mod types;
pub mod vector;
pub mod waypoints;
