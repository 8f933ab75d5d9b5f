//! Header scanning: the first line of every corpus file, nothing more.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::StringRecord;
use log::debug;

use crate::{error::PipelineError, io_utils, parse::CsvFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub path: PathBuf,
    /// Column names in file order, lowercased and trimmed.
    pub columns: Vec<String>,
}

pub fn scan_header(path: &Path, format: CsvFormat) -> Result<FileHeader> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut line = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut line)
        .with_context(|| format!("Reading header of {path:?}"))?;

    let text = io_utils::decode_bytes(&line, format.encoding)
        .with_context(|| format!("Decoding header of {path:?}"))?;
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return Err(anyhow!("{path:?} has no header line"));
    }

    let mut reader = io_utils::open_csv_reader(text.as_bytes(), format.delimiter, false);
    let mut record = StringRecord::new();
    reader
        .read_record(&mut record)
        .with_context(|| format!("Splitting header of {path:?}"))?;
    let columns = record
        .iter()
        .map(io_utils::normalize_column_name)
        .collect::<Vec<_>>();
    debug!("{path:?}: {} header column(s)", columns.len());
    Ok(FileHeader {
        path: path.to_path_buf(),
        columns,
    })
}

/// Scans every header; the first unreadable file aborts the run.
pub fn scan_headers(paths: &[PathBuf], format: CsvFormat) -> Result<Vec<FileHeader>> {
    paths
        .iter()
        .map(|path| {
            scan_header(path, format).map_err(|err| {
                anyhow::Error::from(PipelineError::discovery(path, format!("{err:#}")))
            })
        })
        .collect()
}
