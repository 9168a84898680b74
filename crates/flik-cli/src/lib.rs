//! Flik CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
//!
//! Operator command-line interface for the Flik batch server.
//!
//! # Overview
//!
//! - **Launching runs**: `flik run collection|enrichment|migration`
//! - **Run status**: `flik status <run-id>` and `flik runs`
//! - **Call budget**: `flik rate-limit`
//!
//! Every command talks to the server's HTTP API; the CLI keeps no state.

pub mod api;
pub mod commands;
pub mod error;
pub mod output;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};

/// Default Flik batch server URL
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Flik - tourism data batch operator
#[derive(Parser, Debug)]
#[command(name = "flik")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Server URL
    #[arg(long, env = "FLIK_SERVER_URL", default_value = DEFAULT_SERVER_URL, global = true)]
    pub server_url: String,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch a pipeline run
    Run {
        #[command(subcommand)]
        pipeline: RunCommand,
    },

    /// Show the status of one run
    Status {
        /// Run id returned by `flik run`
        run_id: uuid::Uuid,
    },

    /// List recent runs
    Runs {
        /// Only runs with this job name, e.g. `collection:32:1`
        #[arg(short, long)]
        job_name: Option<String>,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show today's API call budget
    RateLimit,
}

/// Pipelines that can be launched
#[derive(Subcommand, Debug)]
pub enum RunCommand {
    /// Collect listings for one content type in one area
    Collection {
        /// Area code (1-8, 31-39)
        #[arg(short, long)]
        area: String,

        /// Content type id (12, 14, 15, 28, 32, 38, 39)
        #[arg(short, long)]
        content_type: String,

        /// Rows per listing page
        #[arg(short, long)]
        page_size: Option<u32>,

        /// Service key to use instead of the server default
        #[arg(long)]
        service_key: Option<String>,
    },

    /// Backfill details for collected rows
    Enrichment {
        /// Rows drained per enrichment stage
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Migrate raw rows into spots
    Migration {
        /// Restrict to one content type id
        #[arg(short, long)]
        content_type: Option<String>,
    },

    /// Backfill Google Places ratings and reviews for raw rows
    Places {
        /// Restrict to one content type id (festivals are not backfilled)
        #[arg(short, long)]
        content_type: Option<String>,

        /// Rows visited per content type
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Backfill provider image galleries for spots without images
    Images {
        /// Spots visited in this run
        #[arg(short, long)]
        limit: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_collection() {
        let cli = Cli::try_parse_from([
            "flik",
            "run",
            "collection",
            "--area",
            "1",
            "--content-type",
            "32",
            "--page-size",
            "50",
        ])
        .unwrap();

        assert_eq!(cli.server_url, DEFAULT_SERVER_URL);
        match cli.command {
            Commands::Run {
                pipeline:
                    RunCommand::Collection {
                        area,
                        content_type,
                        page_size,
                        service_key,
                    },
            } => {
                assert_eq!(area, "1");
                assert_eq!(content_type, "32");
                assert_eq!(page_size, Some(50));
                assert!(service_key.is_none());
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_places() {
        let cli = Cli::try_parse_from(["flik", "run", "places", "-c", "39", "--limit", "25"]).unwrap();
        match cli.command {
            Commands::Run {
                pipeline: RunCommand::Places { content_type, limit },
            } => {
                assert_eq!(content_type.as_deref(), Some("39"));
                assert_eq!(limit, Some(25));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_collection_requires_area() {
        assert!(Cli::try_parse_from(["flik", "run", "collection", "--content-type", "32"]).is_err());
    }

    #[test]
    fn test_status_requires_uuid() {
        assert!(Cli::try_parse_from(["flik", "status", "nope"]).is_err());
    }
}
