//! The relational store behind the loader and index builder.
//!
//! [`RelationalSink`] is the small set of commands the pipeline issues against
//! the store. [`PostgresSink`] implements it with a blocking `postgres` client;
//! tests substitute an in-memory implementation.

use std::{
    io::{self, Read},
    time::Duration,
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info};
use postgres::{Client, NoTls};

use crate::{config::ConnectionConfig, schema::ColumnType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub column_type: ColumnType,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A column of a table that already exists in the store, as the store
/// reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingColumn {
    pub name: String,
    pub data_type: String,
}

impl ExistingColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    pub fn matches(&self, column: &TableColumn) -> bool {
        self.name == column.name
            && ColumnType::from_sql_type(&self.data_type) == Some(column.column_type)
    }
}

pub trait RelationalSink {
    /// Columns of `table` in declaration order, or `None` if it does not exist.
    fn table_columns(&mut self, table: &str) -> Result<Option<Vec<ExistingColumn>>>;

    fn drop_table(&mut self, table: &str) -> Result<()>;

    fn create_table(&mut self, table: &str, columns: &[TableColumn]) -> Result<()>;

    fn truncate_table(&mut self, table: &str) -> Result<()>;

    /// Appends headerless comma-separated rows. An empty field is null
    /// whether or not it is quoted. Either every row lands or none does.
    /// Returns the row count.
    fn append_csv(&mut self, table: &str, columns: &[String], data: &mut dyn Read)
    -> Result<u64>;

    fn create_index(&mut self, table: &str, index: &str, column: &str) -> Result<()>;
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn create_table_sql(table: &str, columns: &[TableColumn]) -> String {
    let definitions = columns
        .iter()
        .map(|column| {
            format!(
                "{} {}",
                quote_ident(&column.name),
                column.column_type.sql_type()
            )
        })
        .join(", ");
    format!("CREATE TABLE {} ({definitions})", quote_ident(table))
}

/// `FORCE_NULL` makes a quoted empty field null too; the csv writer quotes
/// the lone field of a null single-column row.
pub fn copy_sql(table: &str, columns: &[String]) -> String {
    let column_list = columns.iter().map(|c| quote_ident(c)).join(", ");
    format!(
        "COPY {} ({column_list}) FROM STDIN WITH (FORMAT csv, NULL '', FORCE_NULL ({column_list}))",
        quote_ident(table)
    )
}

pub fn create_index_sql(table: &str, index: &str, column: &str) -> String {
    format!(
        "CREATE INDEX {} ON {} ({})",
        quote_ident(index),
        quote_ident(table),
        quote_ident(column)
    )
}

pub struct PostgresSink {
    client: Client,
}

impl PostgresSink {
    pub fn connect(connection: &ConnectionConfig) -> Result<Self> {
        let mut config = postgres::Config::new();
        config
            .host(&connection.host)
            .port(connection.port)
            .user(&connection.user)
            .dbname(&connection.database)
            .application_name(env!("CARGO_PKG_NAME"));
        if let Some(password) = connection.resolved_password() {
            config.password(password);
        }
        if let Some(secs) = connection.connect_timeout_secs {
            config.connect_timeout(Duration::from_secs(secs));
        }
        let client = config
            .connect(NoTls)
            .with_context(|| format!("Connecting to {}", connection.describe()))?;
        info!("Connected to {}", connection.describe());
        Ok(Self { client })
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("{sql}");
        self.client
            .batch_execute(sql)
            .with_context(|| format!("Executing `{sql}`"))
    }
}

impl RelationalSink for PostgresSink {
    fn table_columns(&mut self, table: &str) -> Result<Option<Vec<ExistingColumn>>> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text, data_type::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&table],
            )
            .with_context(|| format!("Looking up columns of table {table}"))?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            rows.iter()
                .map(|row| ExistingColumn::new(row.get::<_, String>(0), row.get::<_, String>(1)))
                .collect(),
        ))
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
    }

    fn create_table(&mut self, table: &str, columns: &[TableColumn]) -> Result<()> {
        self.execute(&create_table_sql(table, columns))
    }

    fn truncate_table(&mut self, table: &str) -> Result<()> {
        self.execute(&format!("TRUNCATE TABLE {}", quote_ident(table)))
    }

    fn append_csv(
        &mut self,
        table: &str,
        columns: &[String],
        data: &mut dyn Read,
    ) -> Result<u64> {
        let sql = copy_sql(table, columns);
        let mut transaction = self
            .client
            .transaction()
            .context("Opening load transaction")?;
        let mut writer = transaction
            .copy_in(sql.as_str())
            .with_context(|| format!("Starting `{sql}`"))?;
        io::copy(data, &mut writer).context("Streaming rows to COPY")?;
        let rows = writer.finish().context("Completing COPY")?;
        transaction.commit().context("Committing load transaction")?;
        Ok(rows)
    }

    fn create_index(&mut self, table: &str, index: &str, column: &str) -> Result<()> {
        self.execute(&create_index_sql(table, index, column))
    }
}
