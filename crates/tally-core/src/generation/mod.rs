//! Turns query plans into candidate SQL.

pub mod generator;
pub mod template;
pub mod types;

pub use generator::{clean_sql, GenerationContext, QueryGenerator};
pub use template::render;
pub use types::{CandidateQuery, Strategy};
