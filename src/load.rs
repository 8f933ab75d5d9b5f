//! Bulk loading of normalized files into one table.
//!
//! A run moves through Init (derive the table layout from the first file),
//! Provision (create, recreate or truncate the table), and Stream (one
//! all-or-nothing append per file). The returned [`RunReport`] is the per-file
//! load outcome; only a layout or provisioning problem fails the whole run.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail, ensure};
use csv::StringRecord;
use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    error::PipelineError,
    io_utils,
    profile::ColumnProfile,
    report::{FileOutcome, RunReport, Stage},
    schema::{CanonicalSchema, ColumnType, TypeOverrides},
    sink::{ExistingColumn, RelationalSink, TableColumn},
};

/// Rows sampled from the first file when no usable manifest is present.
pub const TYPE_SAMPLE_ROWS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub columns: Vec<TableColumn>,
}

impl TableLayout {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// True when `existing` has exactly these columns, in order and of the
    /// same types.
    pub fn matches(&self, existing: &[ExistingColumn]) -> bool {
        existing.len() == self.columns.len()
            && existing
                .iter()
                .zip(&self.columns)
                .all(|(have, want)| have.matches(want))
    }

    fn describe(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.column_type.sql_type().to_ascii_lowercase()))
            .join(", ")
    }

    /// Derives the layout from a normalized file's header.
    ///
    /// Types come from `manifest` when it describes exactly these columns;
    /// otherwise they are inferred from the first [`TYPE_SAMPLE_ROWS`] rows,
    /// with columns that sampled only nulls taking their override type or
    /// decimal.
    pub fn from_normalized_file(
        path: &Path,
        manifest: Option<&CanonicalSchema>,
        overrides: &TypeOverrides,
    ) -> Result<Self> {
        let mut reader =
            io_utils::open_csv_reader_from_path(path, io_utils::DEFAULT_CSV_DELIMITER, true)?;
        let names = reader
            .headers()
            .with_context(|| format!("Reading header of {path:?}"))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        ensure!(!names.is_empty(), "{path:?} has an empty header");

        if let Some(schema) = manifest {
            if schema.is_resolved() && schema.ordered_columns() == names {
                debug!("Taking column types for {path:?} from the schema manifest");
                let columns = names
                    .into_iter()
                    .map(|name| {
                        let ty = schema.column_type(&name).unwrap_or(ColumnType::Decimal);
                        TableColumn::new(name, ty)
                    })
                    .collect();
                return Ok(Self { columns });
            }
            warn!("Schema manifest does not match the header of {path:?}; sampling types instead");
        }

        let mut profiles = vec![ColumnProfile::default(); names.len()];
        let mut record = StringRecord::new();
        let mut sampled = 0usize;
        while sampled < TYPE_SAMPLE_ROWS
            && reader
                .read_record(&mut record)
                .with_context(|| format!("Sampling rows of {path:?}"))?
        {
            for (profile, value) in profiles.iter_mut().zip(record.iter()) {
                profile.observe(value);
            }
            sampled += 1;
        }
        debug!("Sampled {sampled} row(s) of {path:?} for column types");
        let columns = names
            .into_iter()
            .zip(profiles)
            .map(|(name, profile)| {
                let ty = profile
                    .decide()
                    .or_else(|| overrides.get(&name))
                    .unwrap_or(ColumnType::Decimal);
                TableColumn::new(name, ty)
            })
            .collect();
        Ok(Self { columns })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub table: String,
    /// Drop and recreate an existing table instead of truncating it.
    pub drop_existing: bool,
}

pub struct BulkLoader<'a> {
    sink: &'a mut dyn RelationalSink,
    options: LoadOptions,
}

impl<'a> BulkLoader<'a> {
    pub fn new(sink: &'a mut dyn RelationalSink, options: LoadOptions) -> Self {
        Self { sink, options }
    }

    /// Leaves an empty table shaped like `layout`.
    pub fn provision(&mut self, layout: &TableLayout) -> Result<()> {
        let table = self.options.table.as_str();
        match self.sink.table_columns(table)? {
            None => {
                info!("Creating table {table} with {} column(s)", layout.columns.len());
                self.sink.create_table(table, &layout.columns)?;
            }
            Some(_) if self.options.drop_existing => {
                info!("Dropping and recreating table {table}");
                self.sink.drop_table(table)?;
                self.sink.create_table(table, &layout.columns)?;
            }
            Some(existing) => {
                if !layout.matches(&existing) {
                    return Err(PipelineError::TableShape {
                        table: table.to_string(),
                        existing: existing
                            .iter()
                            .map(|c| format!("{} {}", c.name, c.data_type))
                            .join(", "),
                        expected: layout.describe(),
                    }
                    .into());
                }
                info!("Truncating existing table {table}");
                self.sink.truncate_table(table)?;
            }
        }
        Ok(())
    }

    /// Appends one normalized file in its own transaction.
    pub fn stream_file(&mut self, layout: &TableLayout, path: &Path) -> Result<u64> {
        let file = File::open(path).with_context(|| format!("Opening {path:?}"))?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .with_context(|| format!("Reading header of {path:?}"))?;
        let header = parse_header_line(line.trim_end_matches(['\r', '\n']))?;
        let expected = layout.column_names();
        if header != expected {
            bail!(
                "Header [{}] does not match table columns [{}]",
                header.join(", "),
                expected.join(", ")
            );
        }
        self.sink
            .append_csv(&self.options.table, &expected, &mut reader)
            .with_context(|| format!("Appending {path:?} to {}", self.options.table))
    }

    /// Runs Init, Provision and Stream over `files` in order.
    pub fn load(
        &mut self,
        files: &[PathBuf],
        manifest: Option<&CanonicalSchema>,
        overrides: &TypeOverrides,
    ) -> Result<RunReport> {
        let Some(first) = files.first() else {
            bail!("No normalized files to load");
        };
        let layout = TableLayout::from_normalized_file(first, manifest, overrides)
            .with_context(|| format!("Deriving table layout from {first:?}"))?;
        self.provision(&layout)?;

        let total = files.len();
        let mut outcomes = Vec::with_capacity(total);
        for (idx, path) in files.iter().enumerate() {
            let outcome = match self.stream_file(&layout, path) {
                Ok(rows) => {
                    info!("[{}/{total}] Loaded {rows} row(s) from {path:?}", idx + 1);
                    FileOutcome::succeeded(path, rows)
                }
                Err(err) => {
                    warn!("[{}/{total}] Load failed for {path:?}: {err:#}", idx + 1);
                    FileOutcome::failed(path, &err)
                }
            };
            outcomes.push(outcome);
        }
        Ok(RunReport::new(Stage::Load, outcomes))
    }
}

fn parse_header_line(line: &str) -> Result<Vec<String>> {
    let mut reader =
        io_utils::open_csv_reader(line.as_bytes(), io_utils::DEFAULT_CSV_DELIMITER, false);
    let mut record = StringRecord::new();
    reader
        .read_record(&mut record)
        .context("Parsing header line")?;
    Ok(record.iter().map(str::to_string).collect())
}
