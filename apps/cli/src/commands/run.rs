//! `tally run`

use super::{build_pipeline, interrupt_token};
use anyhow::Context;
use colored::Colorize;
use std::path::Path;
use std::time::Duration;
use tally_core::batch::{read_questions, write_records, BatchRunner};
use tally_core::TallyConfig;
use tracing::info;

pub async fn execute(
    config: &TallyConfig,
    batch: &Path,
    out: &Path,
    item_timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let items = read_questions(batch).with_context(|| format!("Failed to read questions from {}", batch.display()))?;
    info!(path = %batch.display(), questions = items.len(), "Loaded batch");

    let pipeline = build_pipeline(config)?;
    let mut runner = BatchRunner::new(pipeline, config.concurrency).context("Invalid batch settings")?;
    if let Some(ms) = item_timeout_ms {
        runner = runner.with_item_timeout(Duration::from_millis(ms));
    }

    let (records, summary) = runner.run(items, &interrupt_token()).await;
    write_records(out, &records).with_context(|| format!("Failed to write answers to {}", out.display()))?;

    println!(
        "{} {} questions, {} answered, {} errors, mean confidence {:.2} ({} ms)",
        "tally run".bold().cyan(),
        summary.total,
        summary.answered.to_string().green(),
        if summary.errors > 0 { summary.errors.to_string().red() } else { summary.errors.to_string().normal() },
        summary.mean_confidence,
        summary.duration_ms,
    );
    if summary.low_confidence > 0 {
        println!("  {} answers below confidence threshold", summary.low_confidence.to_string().yellow());
    }
    println!("  wrote {}", out.display());
    Ok(())
}
