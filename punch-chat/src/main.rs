//! Entry point for `punch-chat`.
//!
//! Parses CLI arguments and environment, sets up logging, and hands off to
//! [`punch_chat::app::run`].  Exit code 0 on a normal quit, 1 on any startup
//! or runtime failure.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use punch_chat::app::{self, Frontend};
use punch_chat::config::DISCOVERY_IP_ENV;
use punch_chat::SessionConfig;

/// Chat with a peer behind a NAT over a direct UDP path.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local UDP port to bind to.
    #[arg(long = "lport")]
    local_port: u16,

    /// Remote peer IP address.
    #[arg(long = "rip")]
    peer_ip: String,

    /// Remote peer UDP port.
    #[arg(long = "rport")]
    peer_port: u16,

    /// IP of the discovery host (port 50000).
    #[arg(long, env = DISCOVERY_IP_ENV)]
    discovery_ip: String,

    /// Keep-alive interval in milliseconds; also the delivery-confidence window.
    #[arg(long, default_value_t = 1000)]
    keepalive_ms: u64,

    /// Line-oriented mode instead of the full-screen interface.
    #[arg(long)]
    plain: bool,

    /// Write logs to this file (RUST_LOG sets the level).
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    }
}

fn init_logging(log_file: Option<&Path>, quiet_default: bool) -> Result<()> {
    let default_filter = if quiet_default { "off" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init().context("logger already initialised")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_cli();

    // The full-screen interface owns stderr's terminal too.
    let quiet = !cli.plain && cli.log_file.is_none();
    init_logging(cli.log_file.as_deref(), quiet)?;

    let config = match SessionConfig::new(
        cli.local_port,
        &cli.peer_ip,
        cli.peer_port,
        &cli.discovery_ip,
        Duration::from_millis(cli.keepalive_ms),
    ) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("{}", Cli::command().render_usage());
            std::process::exit(1);
        }
    };

    let frontend = if cli.plain {
        Frontend::Plain
    } else {
        Frontend::Terminal
    };
    app::run(config, frontend).await.context("session failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "punch-chat",
            "--lport",
            "5000",
            "--rip",
            "10.0.0.5",
            "--rport",
            "6000",
            "--discovery-ip",
            "203.0.113.9",
            "--plain",
        ])
        .unwrap();
        assert_eq!(cli.local_port, 5000);
        assert_eq!(cli.peer_ip, "10.0.0.5");
        assert_eq!(cli.peer_port, 6000);
        assert_eq!(cli.keepalive_ms, 1000);
        assert!(cli.plain);
    }

    #[test]
    fn missing_peer_is_an_error() {
        assert!(Cli::try_parse_from(["punch-chat", "--lport", "5000"]).is_err());
    }

    #[test]
    fn discovery_ip_falls_back_to_the_environment() {
        std::env::set_var(DISCOVERY_IP_ENV, "198.51.100.7");
        let cli = Cli::try_parse_from([
            "punch-chat",
            "--lport",
            "5000",
            "--rip",
            "10.0.0.5",
            "--rport",
            "6000",
        ])
        .unwrap();
        assert_eq!(cli.discovery_ip, "198.51.100.7");
    }
}
