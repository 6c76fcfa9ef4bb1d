//! CLI `get`, `list` and `delete` commands.

use anyhow::Result;

use hsgmem::engine::HsgEngine;
use hsgmem::memory::types::Sector;

/// Show full details for a single memory.
pub async fn get(engine: &HsgEngine, id: &str, json: bool) -> Result<()> {
    let detail = engine.get_memory(id).await?;
    if json {
        return super::print_json(&detail);
    }

    let m = &detail.memory;
    let sectors: Vec<&str> = detail.sectors.iter().map(|s| s.as_str()).collect();
    println!("Memory: {}", m.id);
    println!("{}", "=".repeat(50));
    println!("  Primary sector: {}", m.primary_sector);
    println!("  Vectors:        {}", sectors.join(", "));
    println!("  Salience:       {:.4}", m.salience);
    println!("  Decay lambda:   {}", m.decay_lambda);
    println!("  Created:        {}", m.created_at);
    println!("  Updated:        {}", m.updated_at);
    println!("  Last seen:      {}", m.last_seen_at);
    if !m.tags.is_empty() {
        println!("  Tags:           {}", m.tags.join(", "));
    }
    if let Some(ref meta) = m.metadata {
        println!("  Metadata:       {}", serde_json::to_string_pretty(meta)?);
    }
    println!();
    println!("Content:");
    println!("  {}", m.content);
    Ok(())
}

pub async fn list(
    engine: &HsgEngine,
    limit: usize,
    offset: usize,
    sector: Option<Sector>,
    json: bool,
) -> Result<()> {
    let memories = engine.list_memories(limit, offset, sector).await?;
    if json {
        return super::print_json(&memories);
    }

    if memories.is_empty() {
        println!("No memories.");
        return Ok(());
    }

    println!("{:<38} {:<11} {:<9} Preview", "ID", "Sector", "Salience");
    println!("{}", "-".repeat(90));
    for m in &memories {
        println!(
            "{:<38} {:<11} {:<9.4} {}",
            m.id,
            m.primary_sector.as_str(),
            m.salience,
            super::preview(&m.content, 40)
        );
    }
    Ok(())
}

pub async fn delete(engine: &HsgEngine, id: &str, json: bool) -> Result<()> {
    let result = engine.delete_memory(id).await?;
    if json {
        return super::print_json(&result);
    }
    println!(
        "Deleted {} ({} vectors, {} waypoints).",
        result.id, result.vectors_removed, result.waypoints_removed
    );
    Ok(())
}
