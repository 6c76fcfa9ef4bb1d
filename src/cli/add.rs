//! CLI `add` command.

use anyhow::{Context, Result};

use hsgmem::engine::HsgEngine;

/// Add one memory from the terminal.
pub async fn add(
    engine: &HsgEngine,
    content: &str,
    tags: Vec<String>,
    metadata: Option<&str>,
    json: bool,
) -> Result<()> {
    let metadata = metadata
        .map(|m| serde_json::from_str::<serde_json::Value>(m))
        .transpose()
        .context("--metadata must be valid JSON")?;

    let result = engine.add_memory(content, tags, metadata).await?;

    if json {
        return super::print_json(&result);
    }

    let sectors: Vec<&str> = result.sectors.iter().map(|s| s.as_str()).collect();
    println!("Stored memory {}", result.id);
    println!("  Primary sector: {}", result.primary_sector);
    println!("  Sectors:        {}", sectors.join(", "));
    println!("  Chunks:         {}", result.chunk_count);
    if let Some(ref linked) = result.linked_to {
        println!("  Linked to:      {linked}");
    }
    Ok(())
}
