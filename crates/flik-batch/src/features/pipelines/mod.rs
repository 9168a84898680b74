//! Pipelines feature module
//!
//! Launch pipeline runs, inspect their progress and read the daily call
//! budget. Launches return immediately; the run continues in the background.

pub mod commands;
pub mod queries;
pub mod routes;

#[cfg(test)]
mod routes_test;

pub use routes::pipelines_routes;
