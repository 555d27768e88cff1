//! Corpus documents: markdown files split into paragraph chunks.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::retrieval::error::{CorpusError, CorpusResult};

/// Characters kept in a passage snippet.
pub const SNIPPET_CHARS: usize = 200;

/// A retrievable unit of text.
///
/// Ids look like `product_policy::chunk2`: the file stem plus the position of
/// the paragraph in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(skip)]
    pub term_freqs: BTreeMap<String, u32>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut term_freqs = BTreeMap::new();
        for token in tokenize(&text) {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        Self { id: id.into(), text, term_freqs }
    }

    /// First [`SNIPPET_CHARS`] characters, cut on a char boundary.
    pub fn snippet(&self) -> String {
        snippet(&self.text)
    }
}

pub fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// Splits a markdown file into one document per blank-line separated paragraph.
///
/// Empty paragraphs are skipped but still advance the chunk counter, so ids
/// stay stable when whitespace changes elsewhere in the file.
pub fn chunk_markdown(stem: &str, content: &str) -> Vec<Document> {
    let normalized = content.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .enumerate()
        .filter(|(_, part)| !part.trim().is_empty())
        .map(|(idx, part)| Document::new(format!("{stem}::chunk{idx}"), part.trim()))
        .collect()
}

/// Loads every `.md` file directly under `dir`, in file-name order.
pub fn load_corpus(dir: &Path) -> CorpusResult<Vec<Document>> {
    if !dir.is_dir() {
        return Err(CorpusError::NotFound(dir.display().to_string()));
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("md")))
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("doc").to_string();
        let content = std::fs::read_to_string(&path)?;
        let chunks = chunk_markdown(&stem, &content);
        debug!(file = %path.display(), chunks = chunks.len(), "Chunked document");
        documents.extend(chunks);
    }

    info!(dir = %dir.display(), documents = documents.len(), "Loaded corpus");
    Ok(documents)
}

/// Lowercased alphanumeric tokens with stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1 && !is_stop_word(w))
        .collect()
}

fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the"
            | "and"
            | "for"
            | "are"
            | "but"
            | "not"
            | "you"
            | "all"
            | "can"
            | "was"
            | "one"
            | "our"
            | "has"
            | "have"
            | "its"
            | "this"
            | "that"
            | "with"
            | "from"
            | "they"
            | "been"
            | "were"
            | "what"
            | "which"
            | "when"
            | "will"
            | "into"
            | "than"
            | "then"
            | "them"
            | "their"
            | "there"
            | "these"
            | "those"
            | "does"
            | "did"
            | "how"
            | "is"
            | "it"
            | "of"
            | "on"
            | "or"
            | "to"
            | "in"
            | "an"
            | "as"
            | "at"
            | "be"
            | "by"
            | "do"
            | "if"
            | "so"
            | "we"
    )
}
