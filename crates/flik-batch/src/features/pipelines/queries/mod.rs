//! Pipeline queries

pub mod get_rate_limit;
pub mod get_run;
pub mod list_runs;

pub use get_rate_limit::GetRateLimitQuery;
pub use get_run::GetRunQuery;
pub use list_runs::ListRunsQuery;
