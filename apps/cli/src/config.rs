//! Command-line configuration overrides.
//!
//! Configuration precedence:
//! 1. CLI arguments
//! 2. Environment variables (`TALLY_*`)
//! 3. Local config file (./.tallyrc)
//! 4. Global config file (~/.tally/config.toml)
//! 5. Defaults

use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use tally_core::{ConfigLayer, TallyConfig};

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Markdown corpus directory
    #[arg(long, global = true)]
    pub docs: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Exemplar set JSON file (defaults to the built-in baseline)
    #[arg(long, global = true)]
    pub exemplars: Option<PathBuf>,

    /// Model as `provider:id` or a bare id (e.g. ollama:qwen2:1.5b)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Passages retrieved per question
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// Generate-and-execute attempts per question
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Per-query execution budget in milliseconds
    #[arg(long, global = true)]
    pub query_timeout_ms: Option<u64>,

    /// Questions answered in parallel
    #[arg(short = 'j', long, global = true)]
    pub concurrency: Option<usize>,

    /// Reference date for relative periods (YYYY-MM-DD)
    #[arg(long, global = true)]
    pub as_of: Option<NaiveDate>,
}

impl ConfigArgs {
    fn to_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer {
            docs_path: self.docs.clone(),
            database_path: self.db.clone(),
            exemplars_path: self.exemplars.clone(),
            top_k: self.top_k,
            max_attempts: self.max_attempts,
            query_timeout_ms: self.query_timeout_ms,
            concurrency: self.concurrency,
            as_of: self.as_of,
            ..ConfigLayer::default()
        };
        if let Some(spec) = &self.model {
            layer.set_model_spec(spec);
        }
        layer
    }
}

/// Discover configuration files and environment, then apply the flags.
pub fn load(args: &ConfigArgs) -> anyhow::Result<TallyConfig> {
    TallyConfig::discover(&args.to_layer()).context("Failed to load configuration")
}
