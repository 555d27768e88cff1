//! Query planning: metric, filters, period and grouping extracted from a question.

pub mod error;
pub mod metrics;
pub mod plan;
pub mod planner;
pub mod time;

pub use error::{PlanError, PlanResult};
pub use metrics::{COGS_APPROXIMATION_RATIO, LineItem};
pub use plan::{Dimension, Metric, PlanId, Provenance, QueryPlan, SortOrder, TimeRange};
pub use planner::Planner;
pub use time::{find_iso_range, parse_period, PeriodMatch};
