//! shs-cli - Command line tool for Sentinel Hub Statistical API requests.

use clap::Parser;
use log::debug;

#[derive(Parser)]
#[command(
    name = "shs-cli",
    version,
    about = "Sentinel Hub Statistical API toolkit"
)]
struct Cli {
    #[command(subcommand)]
    command: shs_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("Starting shs-cli {}", env!("CARGO_PKG_VERSION"));
    shs_cmd::run(cli.command).await
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::{CommandFactory, Parser};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stats_command() {
        let cli = Cli::try_parse_from([
            "shs-cli",
            "stats",
            "--bbox",
            "46.16,-16.15,46.51,-15.58",
            "-e",
            "ndvi.js",
            "--from",
            "2020-01-01",
            "--to",
            "2020-02-01",
            "--size",
            "512x512",
            "--collection",
            "byoc-1234",
            "-o",
            "stats.json",
        ])
        .unwrap();
        match cli.command {
            shs_cmd::Command::Stats { request, output, redownload, .. } => {
                assert_eq!(request.size, Some((512, 512)));
                assert_eq!(request.interval, "P1D");
                assert_eq!(request.collection.api_id(), "byoc-1234");
                assert_eq!(output.unwrap().to_str(), Some("stats.json"));
                assert!(!redownload);
            }
            _ => panic!("expected stats command"),
        }
    }

    #[test]
    fn test_rejects_unknown_collection() {
        let result = Cli::try_parse_from([
            "shs-cli", "payload", "-e", "ndvi.js", "--from", "2020-01-01", "--collection", "sentinel-9",
        ]);
        assert!(result.is_err());
    }
}
