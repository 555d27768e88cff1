//! `tally schema`

use super::build_pipeline;
use tally_core::TallyConfig;

pub fn execute(config: &TallyConfig) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    println!("{}", pipeline.schema().describe());
    Ok(())
}
