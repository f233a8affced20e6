use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "claimsight")]
#[command(author, version, about = "Multimodal accident claim adjudication", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a case end to end and print its outcome
    Run {
        /// Case request JSON
        #[arg(long)]
        case: PathBuf,

        /// Circumstance rules given to the adjudicator
        #[arg(long)]
        ruleset: PathBuf,

        /// Runtime configuration YAML
        #[arg(long)]
        config: Option<PathBuf>,

        /// Prompt overrides YAML
        #[arg(long)]
        prompts: Option<PathBuf>,

        /// Pretty-print the outcome
        #[arg(long)]
        pretty: bool,
    },

    /// Check a case request without dispatching anything
    Validate {
        /// Case request JSON
        #[arg(long)]
        case: PathBuf,
    },

    /// Decode saved adjudicator output
    Decode {
        /// File with the raw response, or "-" for stdin
        input: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "claimsight",
            "run",
            "--case",
            "case.json",
            "--ruleset",
            "rules.md",
            "--pretty",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                case,
                ruleset,
                prompts,
                pretty,
                ..
            } => {
                assert_eq!(case, PathBuf::from("case.json"));
                assert_eq!(ruleset, PathBuf::from("rules.md"));
                assert!(prompts.is_none());
                assert!(pretty);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_ruleset() {
        assert!(Cli::try_parse_from(["claimsight", "run", "--case", "case.json"]).is_err());
    }

    #[test]
    fn test_decode_accepts_stdin_marker() {
        let cli = Cli::try_parse_from(["claimsight", "decode", "-"]).unwrap();
        assert!(matches!(cli.command, Commands::Decode { input } if input == PathBuf::from("-")));
    }
}
