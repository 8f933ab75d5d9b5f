//! Pipeline configuration loaded from YAML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration for the green taxi corpus. CLI flags override the
//! loaded values in `lib.rs`.

use std::{env, fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    cli::parse_delimiter, dispatch::WorkerLimit, io_utils, parse::CsvFormat,
    schema::TypeOverrides,
};

pub const PASSWORD_ENV: &str = "PGPASSWORD";

/// How to reach the relational sink. Passed explicitly to the sink on connect.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub connect_timeout_secs: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "nyc_green_taxi".to_string(),
            connect_timeout_secs: Some(10),
        }
    }
}

impl ConnectionConfig {
    /// Password from the config file, falling back to `PGPASSWORD`.
    pub fn resolved_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| env::var(PASSWORD_ENV).ok())
            .filter(|value| !value.is_empty())
    }

    /// Connection target without credentials, for logs and errors.
    pub fn describe(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub connection: ConnectionConfig,
    pub table: String,
    pub index_columns: Vec<String>,
    pub max_workers: usize,
    pub delimiter: String,
    pub input_encoding: Option<String>,
    pub type_overrides: TypeOverrides,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            table: "green_taxi_records".to_string(),
            index_columns: vec![
                "lpep_pickup_datetime".to_string(),
                "lpep_dropoff_datetime".to_string(),
            ],
            max_workers: WorkerLimit::DEFAULT_MAX,
            delimiter: ",".to_string(),
            input_encoding: None,
            type_overrides: TypeOverrides::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: PipelineConfig = serde_yaml::from_reader(reader)
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn csv_format(&self) -> Result<CsvFormat> {
        let delimiter = parse_delimiter(&self.delimiter)
            .map_err(|err| anyhow::anyhow!("Invalid delimiter '{}': {err}", self.delimiter))?;
        let encoding = io_utils::resolve_encoding(self.input_encoding.as_deref())?;
        Ok(CsvFormat {
            delimiter,
            encoding,
        })
    }

    pub fn worker_limit(&self) -> WorkerLimit {
        WorkerLimit::resolve(self.max_workers)
    }

    pub fn index_columns(&self) -> Vec<String> {
        self.index_columns
            .iter()
            .map(|column| io_utils::normalize_column_name(column))
            .filter(|column| !column.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_yields_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "{{}}").unwrap();
        let config = PipelineConfig::load(file.path()).expect("load");
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.table, "green_taxi_records");
        assert_eq!(config.type_overrides.version, 1);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(
            file,
            "connection:\n  host: db.internal\n  password: s3cret\ntable: trips\nmax_workers: 2\ndelimiter: tab\ntype_overrides:\n  version: 7\n  columns:\n    Ehail_Fee: decimal\n"
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).expect("load");
        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.port, 5432);
        assert_eq!(config.table, "trips");
        assert_eq!(config.csv_format().expect("format").delimiter, b'\t');
        assert!(config.worker_limit().get() <= 2);
        assert_eq!(config.type_overrides.version, 7);
        assert_eq!(
            config.type_overrides.get("ehail_fee"),
            Some(ColumnType::Decimal)
        );
        assert_eq!(config.type_overrides.get("pulocationid"), None);
    }

    #[test]
    fn debug_output_redacts_password() {
        let connection = ConnectionConfig {
            password: Some("hunter2".to_string()),
            ..ConnectionConfig::default()
        };
        let rendered = format!("{connection:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert_eq!(
            connection.describe(),
            "postgres://postgres@localhost:5432/nyc_green_taxi"
        );
    }

    #[test]
    fn configured_password_wins_over_environment() {
        let connection = ConnectionConfig {
            password: Some("from-config".to_string()),
            ..ConnectionConfig::default()
        };
        assert_eq!(connection.resolved_password().as_deref(), Some("from-config"));
    }
}
