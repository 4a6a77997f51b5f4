// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for taskseq

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use std::path::PathBuf;

use crate::parser::Format;

#[derive(Parser)]
#[command(name = "taskseq")]
#[command(about = "Execute declarative task sequences written in XML, JSON, or YAML")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a task sequence
    Run {
        #[arg(help = "Path to the task sequence document")]
        file: PathBuf,

        #[arg(long, help = "Run top-level steps concurrently")]
        parallel: bool,

        #[arg(long, help = "Maximum number of concurrent branches in parallel mode")]
        max_parallelism: Option<usize>,

        #[arg(
            short = 'V',
            long = "var",
            help = "Set or override a sequence variable (name=value)"
        )]
        vars: Vec<String>,

        #[arg(short, long, value_enum, help = "Document format (detected when omitted)")]
        format: Option<Format>,

        #[arg(short, long, help = "Write the execution context as JSON to this file")]
        output: Option<PathBuf>,
    },

    /// Parse and validate a task sequence without executing it
    Validate {
        #[arg(help = "Path to the task sequence document")]
        file: PathBuf,

        #[arg(short, long, value_enum, help = "Document format (detected when omitted)")]
        format: Option<Format>,
    },

    /// Convert a task sequence to another format
    Convert {
        #[arg(help = "Path to the task sequence document")]
        file: PathBuf,

        #[arg(long, value_enum, help = "Target format")]
        to: Format,

        #[arg(short, long, value_enum, help = "Source format (detected when omitted)")]
        format: Option<Format>,

        #[arg(short, long, help = "Output file (stdout when omitted)")]
        output: Option<PathBuf>,
    },

    /// Report which format claims a document
    Detect {
        #[arg(help = "Path to the task sequence document")]
        file: PathBuf,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parse variables from name=value format. Later duplicates win.
    pub fn parse_variables(vars: &[String]) -> anyhow::Result<IndexMap<String, String>> {
        let mut variables = IndexMap::new();

        for var in vars {
            match var.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    variables.insert(key.trim().to_string(), value.to_string());
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "Invalid variable format '{}'. Expected 'name=value'",
                        var
                    ));
                }
            }
        }

        Ok(variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variables() {
        let vars = vec![
            "OSDComputerName=LAB-01".to_string(),
            "Query=a=b".to_string(),
            "Empty=".to_string(),
        ];

        let parsed = Args::parse_variables(&vars).unwrap();

        assert_eq!(parsed.get("OSDComputerName").map(String::as_str), Some("LAB-01"));
        assert_eq!(parsed.get("Query").map(String::as_str), Some("a=b"));
        assert_eq!(parsed.get("Empty").map(String::as_str), Some(""));
    }

    #[test]
    fn test_parse_variables_invalid() {
        assert!(Args::parse_variables(&["no_separator".to_string()]).is_err());
        assert!(Args::parse_variables(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_run_arguments() {
        let args = Args::try_parse_from([
            "taskseq",
            "run",
            "deploy.xml",
            "--parallel",
            "--max-parallelism",
            "3",
            "--var",
            "A=1",
            "--format",
            "xml",
        ])
        .unwrap();

        match args.command {
            Commands::Run {
                file,
                parallel,
                max_parallelism,
                vars,
                format,
                output,
            } => {
                assert_eq!(file, PathBuf::from("deploy.xml"));
                assert!(parallel);
                assert_eq!(max_parallelism, Some(3));
                assert_eq!(vars, vec!["A=1".to_string()]);
                assert_eq!(format, Some(Format::Xml));
                assert!(output.is_none());
            }
            _ => panic!("expected run command"),
        }
    }
}
