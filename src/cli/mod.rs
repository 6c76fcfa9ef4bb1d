pub mod add;
pub mod graph;
pub mod ingest;
pub mod inspect;
pub mod maintenance;
pub mod search;
pub mod stats;

use anyhow::Result;
use serde::Serialize;

/// Pretty-print any serializable result to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// First `max_chars` characters of `content`, with `...` when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
