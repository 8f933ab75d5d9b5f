//! Row normalization: one raw file in, one canonical file out.
//!
//! Every output file carries exactly the canonical columns in canonical order,
//! fills columns the source lacks with nulls, and renders each value for the
//! resolved column type. Output goes through [`AtomicFile`] so a file that
//! fails halfway leaves nothing behind for the loader to pick up.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail, ensure};
use log::debug;

use crate::{
    data::{is_null, render_value},
    io_utils::{self, AtomicFile},
    parse::{CsvFormat, TolerantParse, TolerantReader, detect_layout},
    schema::{CanonicalSchema, ColumnType},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub rows: u64,
    /// Trailing fields dropped from each row by the tolerant parser.
    pub extra_fields: usize,
    /// Canonical columns the source did not carry.
    pub filled_columns: Vec<String>,
}

/// Where each canonical column comes from in the source row.
struct ColumnPlan {
    name: String,
    source_index: Option<usize>,
    column_type: ColumnType,
}

fn plan_columns(schema: &CanonicalSchema, headers: &[String]) -> Result<Vec<ColumnPlan>> {
    if let Some(unknown) = headers.iter().find(|name| !schema.columns.contains(*name)) {
        bail!("column '{unknown}' is not part of the canonical schema");
    }
    schema
        .columns
        .iter()
        .map(|name| {
            let column_type = schema
                .column_type(name)
                .ok_or_else(|| anyhow!("column '{name}' has no resolved type"))?;
            Ok(ColumnPlan {
                name: name.clone(),
                source_index: headers.iter().position(|h| h == name),
                column_type,
            })
        })
        .collect()
}

/// Normalizes `path` into `output_dir`, keeping the source file name.
pub fn normalize_file(
    path: &Path,
    schema: &CanonicalSchema,
    output_dir: &Path,
    format: CsvFormat,
) -> Result<NormalizedFile> {
    ensure!(
        schema.is_resolved(),
        "Canonical schema must have resolved types before normalizing"
    );
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{path:?} has no file name"))?;
    let destination = output_dir.join(file_name);
    ensure!(
        destination != path,
        "Refusing to overwrite source file {path:?}"
    );

    let layout = detect_layout(path, format)?;
    let headers = match &layout {
        TolerantParse::Unrecoverable { reason } => bail!("{path:?} cannot be parsed: {reason}"),
        other => other.headers().map(<[String]>::to_vec).unwrap_or_default(),
    };
    let plan = plan_columns(schema, &headers)
        .with_context(|| format!("Mapping {path:?} onto the canonical schema"))?;
    let filled_columns = plan
        .iter()
        .filter(|column| column.source_index.is_none())
        .map(|column| column.name.clone())
        .collect::<Vec<_>>();

    let mut output = AtomicFile::create(&destination)?;
    let rows = {
        let mut writer =
            io_utils::open_csv_writer(output.writer(), io_utils::DEFAULT_CSV_DELIMITER);
        writer
            .write_record(plan.iter().map(|column| column.name.as_str()))
            .with_context(|| format!("Writing header to {destination:?}"))?;

        let mut reader = TolerantReader::open(path, format, &layout)?;
        let mut out_row = vec![String::new(); plan.len()];
        let mut rows = 0u64;
        while let Some(row) = reader
            .next_row()
            .with_context(|| format!("Reading {path:?} after {rows} row(s)"))?
        {
            for (slot, column) in out_row.iter_mut().zip(&plan) {
                slot.clear();
                let Some(idx) = column.source_index else {
                    continue;
                };
                let value = &row[idx];
                if is_null(value) {
                    continue;
                }
                *slot = render_value(value, column.column_type).with_context(|| {
                    format!(
                        "Row {} column '{}' of {path:?} does not fit type {}",
                        rows + 1,
                        column.name,
                        column.column_type
                    )
                })?;
            }
            writer
                .write_record(&out_row)
                .with_context(|| format!("Writing row {} to {destination:?}", rows + 1))?;
            rows += 1;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing {destination:?}"))?;
        rows
    };
    output.commit()?;

    debug!(
        "Normalized {path:?} -> {destination:?}: {rows} row(s), {} filled column(s)",
        filled_columns.len()
    );
    Ok(NormalizedFile {
        source: path.to_path_buf(),
        output: destination,
        rows,
        extra_fields: layout.extra_fields(),
        filled_columns,
    })
}
