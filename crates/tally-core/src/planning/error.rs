use thiserror::Error;

use crate::routing::RouteMode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The planner only runs for routes that query the database.
    #[error("Planner invoked for route '{0}', which does not query the database")]
    NotQueryRoute(RouteMode),

    #[error("Question text is empty")]
    EmptyQuestion,
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
