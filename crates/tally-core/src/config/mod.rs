//! Configuration for Tally runs.

mod tally_config;

pub use tally_config::{
    ConfigError, ConfigLayer, ConfigResult, ModelSection, TallyConfig, DEFAULT_CONCURRENCY, DEFAULT_DATABASE_PATH,
    DEFAULT_DOCS_PATH, DEFAULT_QUERY_TIMEOUT_MS, DEFAULT_TOP_K,
};
