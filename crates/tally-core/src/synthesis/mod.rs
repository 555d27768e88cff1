//! Fusion of passages and query rows into one answer.

pub mod citations;
pub mod evidence;
pub mod format;
pub mod synthesizer;

pub use citations::{citations, referenced_tables};
pub use evidence::{confidence, Evidence, EvidenceFlag};
pub use format::{format_currency, format_metric, truncate_at_sentence, with_thousands, FormatHint};
pub use synthesizer::{Answer, SynthesisInput, Synthesizer, EXPLANATION_CHARS};
