#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::mem;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use csv_unify::data::{parse_decimal, parse_integer, parse_timestamp};
use csv_unify::schema::ColumnType;
use csv_unify::sink::{ExistingColumn, RelationalSink, TableColumn, copy_sql};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Creates (if needed) and returns a subdirectory of the workspace.
    pub fn dir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::create_dir_all(&path).expect("create workspace dir");
        path
    }

    /// Writes `contents` into `dir/name` and returns the path.
    pub fn write_in(&self, dir: &str, name: &str, contents: &str) -> PathBuf {
        let path = self.dir(dir).join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// In-memory stand-in for the relational store.
///
/// Appends follow the COPY statement the real sink issues: an unquoted empty
/// field is null, a quoted empty field is null only under `FORCE_NULL`, and
/// anything else (whitespace included) must parse as the column type. Every
/// row is checked before touching the table, so a bad row leaves the table
/// exactly as it was.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub tables: BTreeMap<String, MemoryTable>,
    pub indices: BTreeSet<String>,
    pub statements: Vec<String>,
}

impl MemorySink {
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn column_types(&self, table: &str) -> Vec<(String, ColumnType)> {
        self.tables
            .get(table)
            .map(|t| {
                t.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.column_type))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Values of `column` across all rows, `None` for nulls.
    pub fn column_values(&self, table: &str, column: &str) -> Vec<Option<String>> {
        let Some(t) = self.tables.get(table) else {
            return Vec::new();
        };
        let Some(idx) = t.columns.iter().position(|c| c.name == column) else {
            return Vec::new();
        };
        t.rows.iter().map(|row| row[idx].clone()).collect()
    }
}

struct CopyField {
    value: String,
    quoted: bool,
}

/// Splits COPY csv input into rows of fields, remembering which were quoted.
fn copy_fields(body: &str) -> Result<Vec<Vec<CopyField>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut value = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c != '"' {
                value.push(c);
            } else if chars.peek() == Some(&'"') {
                chars.next();
                value.push('"');
            } else {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' if value.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            ',' => row.push(CopyField {
                value: mem::take(&mut value),
                quoted: mem::take(&mut quoted),
            }),
            '\r' => {}
            '\n' => {
                row.push(CopyField {
                    value: mem::take(&mut value),
                    quoted: mem::take(&mut quoted),
                });
                rows.push(mem::take(&mut row));
            }
            other => value.push(other),
        }
    }
    if in_quotes {
        bail!("unterminated CSV quoted field");
    }
    if !value.is_empty() || quoted || !row.is_empty() {
        row.push(CopyField { value, quoted });
        rows.push(row);
    }
    Ok(rows)
}

fn check_value(value: &str, ty: ColumnType) -> Result<()> {
    let ok = match ty {
        ColumnType::Integer => parse_integer(value).is_some(),
        ColumnType::Decimal => parse_decimal(value).is_some(),
        ColumnType::Timestamp => parse_timestamp(value).is_ok(),
        ColumnType::Text => true,
    };
    if ok {
        Ok(())
    } else {
        Err(anyhow!("invalid input syntax for type {ty}: \"{value}\""))
    }
}

impl RelationalSink for MemorySink {
    fn table_columns(&mut self, table: &str) -> Result<Option<Vec<ExistingColumn>>> {
        Ok(self.tables.get(table).map(|t| {
            t.columns
                .iter()
                .map(|c| ExistingColumn::new(c.name.clone(), c.column_type.sql_type()))
                .collect()
        }))
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        self.statements.push(format!("drop {table}"));
        self.tables.remove(table);
        Ok(())
    }

    fn create_table(&mut self, table: &str, columns: &[TableColumn]) -> Result<()> {
        self.statements.push(format!("create {table}"));
        if self.tables.contains_key(table) {
            bail!("relation \"{table}\" already exists");
        }
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: columns.to_vec(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn truncate_table(&mut self, table: &str) -> Result<()> {
        self.statements.push(format!("truncate {table}"));
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("relation \"{table}\" does not exist"))?;
        t.rows.clear();
        Ok(())
    }

    fn append_csv(&mut self, table: &str, columns: &[String], data: &mut dyn Read) -> Result<u64> {
        self.statements.push(format!("append {table}"));
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("relation \"{table}\" does not exist"))?;
        let types = columns
            .iter()
            .map(|name| {
                t.columns
                    .iter()
                    .find(|c| &c.name == name)
                    .map(|c| c.column_type)
                    .ok_or_else(|| anyhow!("column \"{name}\" does not exist"))
            })
            .collect::<Result<Vec<_>>>()?;

        let force_null = copy_sql(table, columns).contains("FORCE_NULL");
        let mut body = String::new();
        data.read_to_string(&mut body)
            .context("reading COPY data")?;
        let mut staged = Vec::new();
        for record in copy_fields(&body)? {
            if record.len() != types.len() {
                bail!("row has {} fields, expected {}", record.len(), types.len());
            }
            let mut row = Vec::with_capacity(types.len());
            for (field, ty) in record.into_iter().zip(&types) {
                if field.value.is_empty() && (!field.quoted || force_null) {
                    row.push(None);
                } else {
                    check_value(&field.value, *ty)?;
                    row.push(Some(field.value));
                }
            }
            staged.push(row);
        }
        let count = staged.len() as u64;
        t.rows.extend(staged);
        Ok(count)
    }

    fn create_index(&mut self, table: &str, index: &str, column: &str) -> Result<()> {
        self.statements.push(format!("index {index}"));
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| anyhow!("relation \"{table}\" does not exist"))?;
        if !t.columns.iter().any(|c| c.name == column) {
            bail!("column \"{column}\" does not exist");
        }
        if !self.indices.insert(index.to_string()) {
            bail!("relation \"{index}\" already exists");
        }
        Ok(())
    }
}
