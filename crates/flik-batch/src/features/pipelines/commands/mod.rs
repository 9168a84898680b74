//! Pipeline commands

pub mod start_run;

pub use start_run::StartRunCommand;
