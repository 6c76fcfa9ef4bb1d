//! CLI `ingest` command: store a text file, splitting large ones into sections.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use hsgmem::engine::HsgEngine;
use hsgmem::memory::ingest::{IngestOptions, IngestStrategy};

pub async fn ingest(
    engine: &HsgEngine,
    path: &Path,
    content_type: Option<&str>,
    force_root_child: bool,
    json: bool,
) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let content_type = content_type
        .map(str::to_string)
        .or_else(|| path.extension().map(|e| e.to_string_lossy().to_lowercase()))
        .unwrap_or_else(|| "txt".to_string());
    let metadata = serde_json::json!({ "source": path.display().to_string() });

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} sections")
            .expect("valid template")
            .progress_chars("##-"),
    );

    let options = IngestOptions {
        force_root_child,
        ..Default::default()
    };
    let result = engine
        .ingest_text_with_progress(&text, &content_type, Some(metadata), options, |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await;
    pb.finish_and_clear();
    let result = result?;

    if json {
        return super::print_json(&result);
    }

    match result.strategy {
        IngestStrategy::Single => {
            println!("Stored {} as a single memory: {}", path.display(), result.root_memory_id);
        }
        IngestStrategy::RootChild => {
            println!(
                "Stored {} as root {} with {} sections (~{} tokens).",
                path.display(),
                result.root_memory_id,
                result.child_ids.len(),
                result.estimated_tokens
            );
        }
    }
    Ok(())
}
