//! Tally CLI - answers retail analytics questions from documents and a database.
//!
//! This CLI provides a `tally` command that routes each question to the policy
//! corpus, the Northwind store, or both, and prints typed answer records.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{ask, optimize, run, schema};
use config::ConfigArgs;

/// Tally CLI - hybrid document and SQL question answering
#[derive(Parser, Debug)]
#[command(
    name = "tally",
    author,
    version,
    about = "Tally - answers retail analytics questions with cited evidence",
    long_about = "Tally answers questions about a retail business from a markdown policy corpus and a read-only SQLite database.\nEvery answer carries its route, query, citations and a confidence score."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a batch of questions
    ///
    /// Reads JSON Lines (or a JSON array) of `{id, question, format_hint}`
    /// records and writes one answer record per input line, in input order.
    Run {
        /// Question file
        #[arg(long)]
        batch: PathBuf,

        /// Output file for answer records (JSON Lines)
        #[arg(long)]
        out: PathBuf,

        /// Per-question time limit in milliseconds
        #[arg(long)]
        item_timeout_ms: Option<u64>,
    },

    /// Answer a single question and print the record as JSON
    Ask {
        /// The question text
        question: String,

        /// Expected answer shape (int, float, str, {key:type}, list[...])
        #[arg(long)]
        format_hint: Option<String>,

        /// Record id
        #[arg(long, default_value = "q_1")]
        id: String,
    },

    /// Select the exemplar set that maximises query validity
    ///
    /// Bootstraps exemplars from the training file, scores every candidate on
    /// the validation file and writes the winning set.
    Optimize {
        /// Training exemplars (JSON Lines of `{question, sql}`)
        #[arg(long)]
        train: PathBuf,

        /// Validation questions (JSON Lines of `{question, sql}`)
        #[arg(long)]
        validation: PathBuf,

        /// Output file for the optimized exemplar set
        #[arg(long)]
        out: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the schema description shown to the model
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so record output on stdout stays machine-readable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = config::load(&args.config)?;

    match args.command {
        Command::Run { batch, out, item_timeout_ms } => run::execute(&config, &batch, &out, item_timeout_ms).await?,
        Command::Ask { question, format_hint, id } => ask::execute(&config, id, question, format_hint).await?,
        Command::Optimize { train, validation, out, json } => {
            optimize::execute(&config, &train, &validation, &out, json).await?;
        }
        Command::Schema => schema::execute(&config)?,
    }

    Ok(())
}
