use anyhow::Result;

use hsgmem::engine::HsgEngine;
use hsgmem::memory::search::QueryFilters;
use hsgmem::memory::types::Sector;

/// Run a query from the terminal.
pub async fn query(
    engine: &HsgEngine,
    text: &str,
    k: Option<usize>,
    sectors: Vec<Sector>,
    min_salience: Option<f64>,
    json: bool,
) -> Result<()> {
    let filters = QueryFilters {
        sectors: (!sectors.is_empty()).then_some(sectors),
        min_salience,
    };
    let results = engine.query(text, k, filters).await?;

    if json {
        return super::print_json(&results);
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", results.len());
    for (i, result) in results.iter().enumerate() {
        println!(
            "  {}. [{}] {} (score: {:.4}, salience: {:.2})",
            i + 1,
            result.primary_sector,
            result.id,
            result.score,
            result.salience,
        );
        println!("     {}", super::preview(&result.content, 120));
        if result.path.len() > 1 {
            println!("     via {}", result.path.join(" -> "));
        }
        println!();
    }

    Ok(())
}
