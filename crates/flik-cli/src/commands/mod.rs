//! Command implementations
//!
//! Each command calls one server endpoint and prints the rendered result.

pub mod rate_limit;
pub mod run;
pub mod runs;
pub mod status;
