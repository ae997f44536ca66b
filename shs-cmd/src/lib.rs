//! Command implementations for the Sentinel Hub Statistical CLI.
//!
//! Provides subcommands for building Statistical API payloads, submitting
//! them and flattening the responses to CSV.

use clap::Subcommand;
use std::path::PathBuf;

pub mod flatten;
pub mod request;

#[derive(Subcommand)]
pub enum Command {
    /// Build a Statistical API payload and print it
    Payload {
        #[command(flatten)]
        request: request::RequestArgs,
    },

    /// Submit a Statistical API request and save the response
    Stats {
        #[command(flatten)]
        request: request::RequestArgs,

        /// JSON config file; SH_* environment variables are used otherwise
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Cache requests and responses in this folder
        #[arg(short = 'd', long)]
        data_folder: Option<PathBuf>,

        /// Output path for the response JSON (stdout if omitted)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Ignore cached responses
        #[arg(long)]
        redownload: bool,
    },

    /// Convert a saved response JSON into CSV rows
    Flatten {
        /// Path to the response JSON
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Output path for the CSV
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Payload { request } => request::run_payload(&request),
        Command::Stats {
            request,
            config,
            data_folder,
            output,
            redownload,
        } => {
            request::run_stats(
                &request,
                config.as_deref(),
                data_folder.as_deref(),
                output.as_deref(),
                redownload,
            )
            .await
        }
        Command::Flatten { input, output } => flatten::run_flatten(&input, &output),
    }
}
