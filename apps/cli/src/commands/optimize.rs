//! `tally optimize`

use super::build_pipeline;
use anyhow::Context;
use colored::Colorize;
use std::path::Path;
use tally_core::{ExecutionValidity, TallyConfig};
use tally_training::{
    read_exemplar_set, read_exemplars_jsonl, write_exemplar_set, ExemplarSet, Optimizer, OptimizerOptions,
    TracingProgressSink,
};

pub async fn execute(
    config: &TallyConfig,
    train: &Path,
    validation: &Path,
    out: &Path,
    json_output: bool,
) -> anyhow::Result<()> {
    let train_set =
        read_exemplars_jsonl(train).with_context(|| format!("Failed to read training exemplars {}", train.display()))?;
    let validation_set = read_exemplars_jsonl(validation)
        .with_context(|| format!("Failed to read validation questions {}", validation.display()))?;

    let baseline = match &config.exemplars_path {
        Some(path) => read_exemplar_set(path).with_context(|| format!("Failed to read exemplar set {}", path.display()))?,
        None => ExemplarSet::baseline(),
    };

    let pipeline = build_pipeline(config)?;
    let evaluator = ExecutionValidity::new(&pipeline);
    let progress = TracingProgressSink;
    let optimizer = Optimizer::new(&evaluator, &progress, OptimizerOptions::default());

    let (optimized, report) = optimizer
        .optimize(&baseline, &train_set, &validation_set)
        .await
        .context("Optimization failed")?;
    write_exemplar_set(out, &optimized).with_context(|| format!("Failed to write exemplar set {}", out.display()))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "tally optimize".bold().cyan());
    println!("  baseline   {}  validity {:.3}", report.baseline_id.short(), report.baseline_validity);
    println!("  optimized  {}  validity {:.3}", report.optimized_id.short(), report.optimized_validity);
    println!("  exemplars  {} kept, {} rejected", report.kept_exemplars, report.rejected_exemplars);
    for candidate in &report.candidates {
        println!("    {:<14} {:.3}", candidate.label, candidate.validity);
    }
    if report.improved() {
        println!("  {}", "improved over baseline".green());
    } else {
        println!("  {}", "baseline kept".dimmed());
    }
    println!("  wrote {}", out.display());
    Ok(())
}
