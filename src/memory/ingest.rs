//! Ingestion of already-extracted document text.
//!
//! Small documents become one memory. Large ones (or any document when the
//! caller forces it) become a reflective root memory that summarizes the
//! document plus one child memory per paragraph-aligned section, each linked
//! from the root with a weight-1.0 waypoint. The async part (adding each child)
//! lives in the engine; this module holds the pure pieces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::memory::types::{Memory, Sector};

/// Characters of the document kept in the root memory's summary.
const ROOT_PREVIEW_CHARS: usize = 500;
const ROOT_SALIENCE: f64 = 1.0;
const ROOT_DECAY_LAMBDA: f64 = 0.1;
/// Weight of the root → child edge.
pub const ROOT_CHILD_WEIGHT: f64 = 1.0;

/// Per-call ingestion knobs. `None` falls back to the configured value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestOptions {
    #[serde(default)]
    pub force_root_child: bool,
    #[serde(default)]
    pub large_doc_threshold: Option<usize>,
    #[serde(default)]
    pub section_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestStrategy {
    Single,
    RootChild,
}

/// Result of an ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub strategy: IngestStrategy,
    /// Root memory for root-child ingests, the single memory otherwise.
    pub root_memory_id: String,
    pub child_ids: Vec<String>,
    pub estimated_tokens: usize,
}

/// Split on blank lines and pack paragraphs into sections of at most
/// `max_chars` characters. Paragraphs longer than that are cut on char boundaries.
pub fn split_sections(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = para.chars().count();

        if para_len > max_chars {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = para.chars().collect();
            sections.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }

        let joined_len = if current.is_empty() { para_len } else { current_len + 2 + para_len };
        if joined_len > max_chars {
            sections.push(std::mem::take(&mut current));
            current.push_str(para);
            current_len = para_len;
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
            current_len = joined_len;
        }
    }

    if !current.is_empty() {
        sections.push(current);
    }
    sections
}

/// Summary content stored on the root memory.
pub fn root_summary(text: &str, content_type: &str, sections: usize) -> String {
    let preview: String = text.chars().take(ROOT_PREVIEW_CHARS).collect();
    let ellipsis = if text.chars().count() > ROOT_PREVIEW_CHARS { "..." } else { "" };
    format!(
        "[Document: {}]\n\n{preview}{ellipsis}\n\n[Full content split across {sections} sections]",
        content_type.to_uppercase()
    )
}

/// Copy of the caller's metadata as an object (non-object values are kept under `"value"`).
pub(crate) fn base_metadata(metadata: Option<&Value>) -> Map<String, Value> {
    match metadata {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".into(), other.clone());
            map
        }
        None => Map::new(),
    }
}

/// Root memory row: reflective, full salience, fast decay, no vectors.
pub fn root_memory(
    id: String,
    text: &str,
    content_type: &str,
    sections: usize,
    metadata: Option<&Value>,
    now: DateTime<Utc>,
) -> Memory {
    let mut meta = base_metadata(metadata);
    meta.insert("is_root".into(), json!(true));
    meta.insert("content_type".into(), json!(content_type));
    meta.insert("total_sections".into(), json!(sections));
    meta.insert("ingestion_strategy".into(), json!("root-child"));

    Memory {
        id,
        content: root_summary(text, content_type, sections),
        primary_sector: Sector::Reflective,
        tags: Vec::new(),
        metadata: Some(Value::Object(meta)),
        created_at: now,
        updated_at: now,
        last_seen_at: now,
        salience: ROOT_SALIENCE,
        decay_lambda: ROOT_DECAY_LAMBDA,
        version: 1,
        mean_dim: None,
        mean_vec: None,
    }
}

pub fn child_metadata(
    metadata: Option<&Value>,
    content_type: &str,
    index: usize,
    total: usize,
    parent_id: &str,
) -> Value {
    let mut meta = base_metadata(metadata);
    meta.insert("is_child".into(), json!(true));
    meta.insert("section_index".into(), json!(index));
    meta.insert("total_sections".into(), json!(total));
    meta.insert("parent_id".into(), json!(parent_id));
    meta.insert("content_type".into(), json!(content_type));
    Value::Object(meta)
}

pub fn single_metadata(metadata: Option<&Value>, content_type: &str) -> Value {
    let mut meta = base_metadata(metadata);
    meta.insert("ingestion_strategy".into(), json!("single"));
    meta.insert("content_type".into(), json!(content_type));
    Value::Object(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_pack_paragraphs_up_to_limit() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        assert_eq!(split_sections(text, 10), vec!["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(split_sections(text, 100), vec![text]);
    }

    #[test]
    fn oversized_paragraph_is_cut() {
        let text = format!("short\n\n{}", "x".repeat(25));
        let sections = split_sections(&text, 10);
        assert_eq!(sections[0], "short");
        assert_eq!(sections.len(), 4);
        assert!(sections.iter().all(|s| s.chars().count() <= 10));
    }

    #[test]
    fn blank_input_has_no_sections() {
        assert!(split_sections("\n\n  \n\n", 10).is_empty());
    }

    #[test]
    fn root_summary_truncates_preview() {
        let text = "y".repeat(600);
        let s = root_summary(&text, "pdf", 3);
        assert!(s.starts_with("[Document: PDF]\n\n"));
        assert!(s.contains(&format!("{}...", "y".repeat(500))));
        assert!(s.ends_with("[Full content split across 3 sections]"));
    }

    #[test]
    fn root_memory_shape() {
        let meta = json!({"source": "upload"});
        let m = root_memory("r".into(), "hello", "txt", 2, Some(&meta), Utc::now());
        assert_eq!(m.primary_sector, Sector::Reflective);
        assert_eq!(m.salience, 1.0);
        assert_eq!(m.decay_lambda, 0.1);
        let meta = m.metadata.unwrap();
        assert_eq!(meta["is_root"], json!(true));
        assert_eq!(meta["source"], json!("upload"));
    }

    #[test]
    fn child_metadata_links_parent() {
        let meta = child_metadata(None, "md", 1, 4, "root-1");
        assert_eq!(meta["is_child"], json!(true));
        assert_eq!(meta["section_index"], json!(1));
        assert_eq!(meta["total_sections"], json!(4));
        assert_eq!(meta["parent_id"], json!("root-1"));
    }
}
