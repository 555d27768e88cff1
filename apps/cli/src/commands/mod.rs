//! Subcommand implementations.

pub mod ask;
pub mod optimize;
pub mod run;
pub mod schema;

use anyhow::Context;
use std::sync::Arc;
use tally_core::{Pipeline, TallyConfig};
use tokio_util::sync::CancellationToken;

/// Build the pipeline once for the whole command.
pub(crate) fn build_pipeline(config: &TallyConfig) -> anyhow::Result<Arc<Pipeline>> {
    let pipeline = Pipeline::from_config(config).with_context(|| {
        format!(
            "Failed to start pipeline (docs: {}, db: {})",
            config.docs_path.display(),
            config.database_path.display()
        )
    })?;
    Ok(Arc::new(pipeline))
}

/// A token cancelled on Ctrl-C.
pub(crate) fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling outstanding questions");
            child.cancel();
        }
    });
    token
}
