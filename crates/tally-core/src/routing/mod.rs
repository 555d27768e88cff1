//! Question routing: document lookup, database query, or both.

pub mod router;
pub mod types;

pub use router::{Router, DOC_CUES, SQL_CUES};
pub use types::{RouteDecision, RouteMode};
