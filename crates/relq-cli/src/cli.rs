//! CLI argument definitions using clap derive API

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// relq - translate relational IR queries into parameterized SQL
#[derive(Parser, Debug)]
#[command(name = "relq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to config file
    #[arg(short, long, global = true, env = "RELQ_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate an IR query (JSON) into SQL and a materializer plan
    Translate(TranslateArgs),

    /// Print the shape fingerprint of an IR query
    Fingerprint(FingerprintArgs),
}

/// Arguments for the translate command
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// IR query file (JSON)
    pub query: PathBuf,

    /// Input values (JSON object) to bind parameters against
    #[arg(short, long)]
    pub inputs: Option<PathBuf>,

    /// Output format (overrides config)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Result row (JSON array) to materialize
    #[arg(short, long)]
    pub row: Option<PathBuf>,
}

/// Arguments for the fingerprint command
#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// IR query file (JSON)
    pub query: PathBuf,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable report
    Text,
    /// Single JSON document
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_translate() {
        let cli = Cli::try_parse_from([
            "relq",
            "translate",
            "query.json",
            "--inputs",
            "inputs.json",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Translate(args) => {
                assert_eq!(args.query, PathBuf::from("query.json"));
                assert_eq!(args.inputs, Some(PathBuf::from("inputs.json")));
                assert_eq!(args.format, Some(OutputFormat::Json));
                assert!(args.row.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["relq", "fingerprint", "q.json", "--config", "relq.yaml"]).unwrap();
        assert_eq!(cli.global.config, PathBuf::from("relq.yaml"));
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["relq", "translate", "q.json", "--format", "xml"]).is_err());
    }
}
