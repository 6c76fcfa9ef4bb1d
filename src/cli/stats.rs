use anyhow::Result;

use hsgmem::engine::HsgEngine;

/// Display memory statistics in the terminal.
pub async fn stats(engine: &HsgEngine, json: bool) -> Result<()> {
    let response = engine.stats().await?;
    if json {
        return super::print_json(&response);
    }

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total memories:      {}", response.total_memories);
    println!("  Vectors:             {}", response.total_vectors);
    println!("  Waypoints:           {}", response.total_waypoints);
    println!();

    println!("By Sector:");
    for (sector, s) in &response.by_sector {
        println!("  {:<12} {:>6}   avg salience {:.3}", sector.as_str(), s.count, s.avg_salience);
    }
    println!();

    println!("Embedding Log:");
    for (status, count) in &response.embed_logs {
        println!("  {:<12} {}", status, count);
    }

    Ok(())
}

pub fn embed_info(engine: &HsgEngine, json: bool) -> Result<()> {
    let info = engine.embedding_info();
    if json {
        return super::print_json(&info);
    }

    println!("Embedding");
    println!("{}", "=".repeat(40));
    println!("  Provider:        {}", info.provider);
    println!("  Dimensions:      {}", info.dimensions);
    println!("  Mode:            {}", info.mode);
    println!("  Batch mode:      {}", info.batch_mode);
    println!("  Parallel:        {}", info.parallel);
    println!("  Serialized:      {}", info.serialized);
    println!("  Sector delay:    {} ms", info.sector_delay_ms);
    println!("  Max retries:     {}", info.max_retries);
    Ok(())
}
