use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cdl",
    about = "Civic Document Ledger: tamper-evident government document registry",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Register, seal, verify, and execute a contract in-process
    Demo(DemoArgs),
    /// Print the default configuration as TOML
    Config,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Server configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the configured bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Leading zero hex digits required of block hashes
    #[arg(long, default_value = "3")]
    pub difficulty: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_with_overrides() {
        let cli =
            Cli::try_parse_from(["cdl", "serve", "--config", "cdl.toml", "--bind", "0.0.0.0:8080"])
                .unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("cdl.toml")));
            assert_eq!(args.bind, Some("0.0.0.0:8080".parse().unwrap()));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::try_parse_from(["cdl", "serve"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert!(args.config.is_none());
            assert!(args.bind.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_demo() {
        let cli = Cli::try_parse_from(["cdl", "demo", "--difficulty", "1", "--format", "json"])
            .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        if let Command::Demo(args) = cli.command {
            assert_eq!(args.difficulty, 1);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["cdl", "--verbose", "config"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Config));
    }

    #[test]
    fn rejects_bad_bind_address() {
        assert!(Cli::try_parse_from(["cdl", "serve", "--bind", "nowhere"]).is_err());
    }
}
