//! `tally ask`

use super::{build_pipeline, interrupt_token};
use tally_core::{Question, TallyConfig};

pub async fn execute(
    config: &TallyConfig,
    id: String,
    text: String,
    format_hint: Option<String>,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;

    let mut question = Question::new(id, text);
    if let Some(hint) = format_hint {
        question = question.with_format_hint(hint);
    }

    let record = pipeline.answer_record(&question, &interrupt_token()).await;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
