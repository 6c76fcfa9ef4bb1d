//! CLI maintenance commands: `reinforce`, `decay`, `prune`, and the long-running `run`.

use anyhow::{Context, Result};

use hsgmem::engine::HsgEngine;
use hsgmem::scheduler::MaintenanceScheduler;

pub async fn reinforce(engine: &HsgEngine, id: &str, boost: Option<f64>, json: bool) -> Result<()> {
    let result = engine.reinforce_memory(id, boost).await?;
    if json {
        return super::print_json(&result);
    }
    println!(
        "Reinforced {}: salience {:.4} -> {:.4}",
        result.id, result.previous_salience, result.salience
    );
    Ok(())
}

pub async fn decay(engine: &HsgEngine, json: bool) -> Result<()> {
    let stats = engine.run_decay_process().await?;
    if json {
        return super::print_json(&stats);
    }
    println!("Processed {} memories, decayed {}.", stats.processed, stats.decayed);
    Ok(())
}

pub async fn prune(engine: &HsgEngine, json: bool) -> Result<()> {
    let pruned = engine.prune_weak_waypoints().await?;
    if json {
        return super::print_json(&serde_json::json!({ "pruned": pruned }));
    }
    println!("Pruned {pruned} weak waypoints.");
    Ok(())
}

/// Run the maintenance scheduler until ctrl-c.
pub async fn run(engine: &HsgEngine) -> Result<()> {
    let config = engine.config().maintenance.clone();
    if !config.enabled {
        println!("Maintenance is disabled in the configuration.");
        return Ok(());
    }

    let scheduler = MaintenanceScheduler::start(engine.clone(), &config);
    println!(
        "Maintenance running (decay every {}h, prune every {}h). Press ctrl-c to stop.",
        config.decay_interval_hours, config.prune_interval_hours
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    scheduler.shutdown().await;
    println!("Stopped.");
    Ok(())
}
