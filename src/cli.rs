use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile schema-drifting CSV files and bulk load them into PostgreSQL",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Remove carriage returns and blank lines from every CSV file in a directory
    Scrub(ScrubArgs),
    /// Scan and profile a corpus and print (or save) its canonical schema
    Schema(SchemaArgs),
    /// Normalize every CSV file of a corpus into the canonical schema
    Unify(UnifyArgs),
    /// Bulk load normalized files into the target table
    Load(LoadArgs),
    /// Create indices on the target table
    Index(IndexArgs),
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Upper bound on parallel workers (capped by available cores)
    #[arg(long = "max-workers", global = true)]
    pub max_workers: Option<usize>,
    /// CSV delimiter of the raw files (supports ',', 'tab', ';', '|')
    #[arg(long, global = true, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the raw files (defaults to utf-8)
    #[arg(long = "input-encoding", global = true)]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ScrubArgs {
    /// Directory of raw CSV files, rewritten in place
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Directory of raw CSV files
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Write the resolved schema as YAML to this path
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct UnifyArgs {
    /// Directory of raw CSV files
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Directory receiving the normalized files and schema manifest
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Directory of normalized CSV files
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Drop and recreate the table instead of truncating it
    #[arg(long = "drop-existing")]
    pub drop_existing: bool,
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Columns to index (defaults to the configured index columns)
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args, Default)]
pub struct TargetArgs {
    /// Target table name
    #[arg(short, long)]
    pub table: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub database: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn delimiter_names_and_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("pipe"), Ok(b'|'));
        assert_eq!(parse_delimiter(":"), Ok(b':'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "csv-unify",
            "load",
            "-i",
            "out",
            "--drop-existing",
            "--table",
            "trips",
            "--max-workers",
            "3",
        ])
        .expect("parse");
        assert_eq!(cli.global.max_workers, Some(3));
        match cli.command {
            Commands::Load(args) => {
                assert!(args.drop_existing);
                assert_eq!(args.target.table.as_deref(), Some("trips"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
