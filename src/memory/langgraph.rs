//! LangGraph memory mode: node-scoped memories for agent graphs.
//!
//! Each graph node kind maps to one sector. Writes go through the ordinary add
//! path, tagged `lgm:node:*` / `lgm:namespace:*` / `lgm:graph:*` and carrying an
//! `lgm` object in their metadata. Reads filter on that object, so memories from
//! other namespaces or graphs never leak into a node's context. The async
//! orchestration lives on the engine; this module holds the request/response
//! types and the pure pieces.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::memory::ingest::base_metadata;
use crate::memory::types::{Memory, Sector};

/// Graph node kinds and the sector each one stores into, in context order.
pub const NODE_SECTORS: [(&str, Sector); 5] = [
    ("observe", Sector::Episodic),
    ("plan", Sector::Semantic),
    ("reflect", Sector::Reflective),
    ("act", Sector::Procedural),
    ("emotion", Sector::Emotional),
];

pub const REFLECT_NODE: &str = "reflect";
/// Unknown node kinds store into this sector.
const DEFAULT_SECTOR: Sector = Sector::Semantic;
/// Per-line cap in context summaries.
pub const SUMMARY_LINE_CHARS: usize = 160;
/// Excerpt of the source content kept in an automatic reflection.
const REFLECTION_EXCERPT_CHARS: usize = 480;
const MODE: &str = "langgraph";

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStoreRequest {
    pub node: String,
    pub content: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub graph_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Overrides the configured auto-reflection setting.
    #[serde(default)]
    pub reflective: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeRetrieveRequest {
    pub node: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub graph_id: Option<String>,
    /// Ranked recall when present, newest-seen listing otherwise.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_metadata: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphContextRequest {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub graph_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReflectionRequest {
    /// Defaults to `reflect`.
    #[serde(default)]
    pub node: Option<String>,
    /// Synthesized from the graph context when absent.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub graph_id: Option<String>,
    #[serde(default)]
    pub context_ids: Vec<String>,
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct StoredNodeMemory {
    pub id: String,
    pub node: String,
    pub primary_sector: Sector,
    pub sectors: Vec<Sector>,
    pub namespace: String,
    pub graph_id: Option<String>,
    pub tags: Vec<String>,
    pub chunks: usize,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStoreResult {
    pub memory: StoredNodeMemory,
    pub reflection: Option<StoredNodeMemory>,
}

/// A memory as seen from a graph node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMemory {
    pub id: String,
    pub node: String,
    pub content: String,
    pub primary_sector: Sector,
    pub sectors: Vec<Sector>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub salience: f64,
    pub decay_lambda: f64,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeRetrieveResult {
    pub node: String,
    pub sector: Sector,
    pub namespace: String,
    pub graph_id: Option<String>,
    pub query: Option<String>,
    pub count: usize,
    pub items: Vec<NodeMemory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeContext {
    pub node: String,
    pub sector: Sector,
    pub items: Vec<NodeMemory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphContext {
    pub namespace: String,
    pub graph_id: Option<String>,
    pub limit: usize,
    pub nodes: Vec<NodeContext>,
    /// One `- [node] content` line per item, capped at `limit` lines.
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LangGraphInfo {
    pub namespace_default: String,
    pub max_context: usize,
    pub reflective: bool,
    pub node_sectors: BTreeMap<&'static str, Sector>,
}

// ── Pure pieces ──────────────────────────────────────────────────────────────

/// Sector a node kind stores into (case-insensitive, semantic when unknown).
pub fn node_sector(node: &str) -> Sector {
    let node = node.to_lowercase();
    NODE_SECTORS
        .iter()
        .find(|(name, _)| *name == node)
        .map_or(DEFAULT_SECTOR, |(_, sector)| *sector)
}

pub fn node_sector_map() -> BTreeMap<&'static str, Sector> {
    NODE_SECTORS.into_iter().collect()
}

/// First `max_chars` characters, trailing whitespace dropped, then `...`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Caller tags plus the node, namespace and graph tags, without duplicates.
pub fn node_tags(tags: &[String], node: &str, namespace: &str, graph_id: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len() + 3);
    let extra = [
        Some(format!("lgm:node:{}", node.to_lowercase())),
        Some(format!("lgm:namespace:{namespace}")),
        graph_id.map(|g| format!("lgm:graph:{g}")),
    ];
    for tag in tags.iter().cloned().chain(extra.into_iter().flatten()) {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Caller metadata with its `lgm` object filled in. Keys already present under
/// `lgm` survive unless overwritten; `extras` are applied last. A top-level
/// `sector` is added when absent so the node's sector becomes the primary one.
pub fn node_metadata(
    metadata: Option<&Value>,
    node: &str,
    sector: Sector,
    namespace: &str,
    graph_id: Option<&str>,
    now: DateTime<Utc>,
    extras: &[(&str, Value)],
) -> Value {
    let mut meta = base_metadata(metadata);
    let mut lgm = match meta.remove("lgm") {
        Some(Value::Object(existing)) => existing,
        _ => Map::new(),
    };
    lgm.insert("node".into(), json!(node.to_lowercase()));
    lgm.insert("sector".into(), json!(sector));
    lgm.insert("namespace".into(), json!(namespace));
    lgm.insert("graph_id".into(), json!(graph_id));
    lgm.insert("stored_at".into(), json!(now.to_rfc3339_opts(SecondsFormat::Millis, true)));
    lgm.insert("mode".into(), json!(MODE));
    for (key, value) in extras {
        lgm.insert((*key).to_string(), value.clone());
    }
    meta.insert("lgm".into(), Value::Object(lgm));
    meta.entry("sector").or_insert_with(|| json!(sector));
    Value::Object(meta)
}

/// Whether a memory's metadata places it in `namespace` (and `graph_id`, when given).
pub fn matches_namespace(metadata: Option<&Value>, namespace: &str, graph_id: Option<&str>) -> bool {
    let Some(lgm) = metadata.and_then(|m| m.get("lgm")).and_then(Value::as_object) else {
        return false;
    };
    if lgm.get("namespace").and_then(Value::as_str) != Some(namespace) {
        return false;
    }
    graph_id.map_or(true, |g| lgm.get("graph_id").and_then(Value::as_str) == Some(g))
}

/// Project a stored memory into the node view.
pub fn node_memory(
    memory: Memory,
    sectors: Vec<Sector>,
    include_metadata: bool,
    score: Option<f64>,
    path: Option<Vec<String>>,
) -> NodeMemory {
    let node = memory
        .metadata
        .as_ref()
        .and_then(|m| m.pointer("/lgm/node"))
        .and_then(Value::as_str)
        .map_or_else(|| memory.primary_sector.as_str().to_string(), str::to_string);
    NodeMemory {
        id: memory.id,
        node,
        content: memory.content,
        primary_sector: memory.primary_sector,
        sectors,
        tags: memory.tags,
        created_at: memory.created_at,
        updated_at: memory.updated_at,
        last_seen_at: memory.last_seen_at,
        salience: memory.salience,
        decay_lambda: memory.decay_lambda,
        version: memory.version,
        score,
        path,
        metadata: if include_metadata { memory.metadata } else { None },
    }
}

/// Content of the reflection stored automatically after a node write.
pub fn reflection_content(node: &str, content: &str, namespace: &str, graph_id: Option<&str>) -> String {
    let mut header = format!("LangGraph reflection for node \"{node}\" | namespace={namespace}");
    if let Some(g) = graph_id {
        header.push_str(&format!(" | graph={g}"));
    }
    format!("{header}\n\n{}", truncate(content, REFLECTION_EXCERPT_CHARS))
}

/// `(node, truncated content)` for every item, in node order.
fn context_lines(nodes: &[NodeContext]) -> impl Iterator<Item = (&str, String)> {
    nodes.iter().flat_map(|entry| {
        entry
            .items
            .iter()
            .map(move |item| (entry.node.as_str(), truncate(&item.content, SUMMARY_LINE_CHARS)))
    })
}

pub fn context_summary(nodes: &[NodeContext], limit: usize) -> String {
    context_lines(nodes)
        .take(limit)
        .map(|(node, content)| format!("- [{node}] {content}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered reflection body built from a graph context, or `None` when the
/// context is empty.
pub fn context_reflection(
    nodes: &[NodeContext],
    namespace: &str,
    graph_id: Option<&str>,
    limit: usize,
) -> Option<String> {
    let body = context_lines(nodes)
        .take(limit)
        .enumerate()
        .map(|(i, (node, content))| format!("{}. [{node}] {content}", i + 1))
        .collect::<Vec<_>>();
    if body.is_empty() {
        return None;
    }
    let scope = match graph_id {
        Some(g) => format!("namespace={namespace}, graph={g}"),
        None => format!("namespace={namespace}"),
    };
    Some(format!(
        "Reflection synthesized from LangGraph context ({scope})\n\n{}",
        body.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(content: &str) -> NodeMemory {
        let now = Utc::now();
        NodeMemory {
            id: "m".into(),
            node: "observe".into(),
            content: content.into(),
            primary_sector: Sector::Episodic,
            sectors: vec![],
            tags: vec![],
            created_at: now,
            updated_at: now,
            last_seen_at: now,
            salience: 0.4,
            decay_lambda: 0.015,
            version: 1,
            score: None,
            path: None,
            metadata: None,
        }
    }

    #[test]
    fn nodes_map_to_sectors() {
        assert_eq!(node_sector("observe"), Sector::Episodic);
        assert_eq!(node_sector("ACT"), Sector::Procedural);
        assert_eq!(node_sector("emotion"), Sector::Emotional);
        assert_eq!(node_sector("summarize"), Sector::Semantic);
        assert_eq!(node_sector_map().len(), 5);
    }

    #[test]
    fn truncate_trims_before_ellipsis() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abc   defgh", 6), "abc...");
        assert_eq!(truncate("héllo", 2), "hé...");
    }

    #[test]
    fn tags_are_deduplicated_in_order() {
        let tags = node_tags(
            &["mine".into(), "lgm:node:plan".into()],
            "Plan",
            "team",
            Some("g1"),
        );
        assert_eq!(tags, vec!["mine", "lgm:node:plan", "lgm:namespace:team", "lgm:graph:g1"]);
        assert_eq!(node_tags(&[], "act", "ns", None).len(), 2);
    }

    #[test]
    fn metadata_merges_existing_lgm_object() {
        let base = json!({"source": "chat", "lgm": {"run": 7, "node": "stale"}});
        let meta = node_metadata(
            Some(&base),
            "Observe",
            Sector::Episodic,
            "team",
            None,
            Utc::now(),
            &[("source_memory", json!("abc"))],
        );
        assert_eq!(meta["source"], json!("chat"));
        assert_eq!(meta["sector"], json!("episodic"));
        assert_eq!(meta["lgm"]["run"], json!(7));
        assert_eq!(meta["lgm"]["node"], json!("observe"));
        assert_eq!(meta["lgm"]["sector"], json!("episodic"));
        assert_eq!(meta["lgm"]["graph_id"], Value::Null);
        assert_eq!(meta["lgm"]["mode"], json!("langgraph"));
        assert_eq!(meta["lgm"]["source_memory"], json!("abc"));
    }

    #[test]
    fn caller_sector_is_kept() {
        let base = json!({"sector": "emotional"});
        let meta = node_metadata(Some(&base), "plan", Sector::Semantic, "ns", None, Utc::now(), &[]);
        assert_eq!(meta["sector"], json!("emotional"));
        assert_eq!(meta["lgm"]["sector"], json!("semantic"));
    }

    #[test]
    fn namespace_and_graph_must_match() {
        let meta = node_metadata(None, "plan", Sector::Semantic, "team", Some("g1"), Utc::now(), &[]);
        assert!(matches_namespace(Some(&meta), "team", None));
        assert!(matches_namespace(Some(&meta), "team", Some("g1")));
        assert!(!matches_namespace(Some(&meta), "team", Some("g2")));
        assert!(!matches_namespace(Some(&meta), "other", None));
        assert!(!matches_namespace(Some(&json!({"source": "x"})), "team", None));
        assert!(!matches_namespace(None, "team", None));
    }

    #[test]
    fn node_view_falls_back_to_primary_sector() {
        let now = Utc::now();
        let memory = Memory {
            id: "m".into(),
            content: "c".into(),
            primary_sector: Sector::Procedural,
            tags: vec![],
            metadata: Some(json!({"k": 1})),
            created_at: now,
            updated_at: now,
            last_seen_at: now,
            salience: 0.5,
            decay_lambda: 0.008,
            version: 1,
            mean_dim: None,
            mean_vec: None,
        };
        let view = node_memory(memory, vec![Sector::Procedural], false, Some(0.7), None);
        assert_eq!(view.node, "procedural");
        assert!(view.metadata.is_none());
        assert_eq!(view.score, Some(0.7));
    }

    #[test]
    fn reflection_content_names_scope() {
        let text = reflection_content("observe", &"z".repeat(600), "team", Some("g1"));
        assert!(text.starts_with("LangGraph reflection for node \"observe\" | namespace=team | graph=g1\n\n"));
        assert!(text.ends_with(&format!("{}...", "z".repeat(480))));
    }

    #[test]
    fn summary_and_reflection_follow_node_order() {
        let nodes = vec![
            NodeContext {
                node: "observe".into(),
                sector: Sector::Episodic,
                items: vec![item("saw a bird"), item("heard rain")],
            },
            NodeContext {
                node: "plan".into(),
                sector: Sector::Semantic,
                items: vec![item("buy an umbrella")],
            },
        ];
        assert_eq!(
            context_summary(&nodes, 10),
            "- [observe] saw a bird\n- [observe] heard rain\n- [plan] buy an umbrella"
        );
        assert_eq!(context_summary(&nodes, 1), "- [observe] saw a bird");

        let reflection = context_reflection(&nodes, "team", None, 10).unwrap();
        assert!(reflection.starts_with("Reflection synthesized from LangGraph context (namespace=team)\n\n"));
        assert!(reflection.ends_with("3. [plan] buy an umbrella"));
        assert!(context_reflection(&[], "team", None, 10).is_none());
    }
}
