//! Tolerant CSV parsing.
//!
//! Some source generations end every data row with stray delimiters, so the
//! first data row carries more fields than the header declares. Layout
//! detection compares the two and reports one of three explicit outcomes
//! ([`TolerantParse`]); [`TolerantReader`] then streams rows shaped to the
//! header: extra trailing fields are dropped in repaired mode and short rows
//! are padded with nulls.

use std::{collections::HashSet, fs::File, io::BufReader, path::Path};

use anyhow::{Result, bail};
use csv::ByteRecord;
use encoding_rs::{Encoding, UTF_8};

use crate::io_utils;

/// Delimiter and text encoding of the raw corpus.
#[derive(Debug, Clone, Copy)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TolerantParse {
    /// Header and first data row agree (or there is no data row).
    Clean { headers: Vec<String> },
    /// The header ends in unnamed columns, or the first data row has
    /// `extra_fields` more fields than the named header columns.
    Repaired {
        headers: Vec<String>,
        extra_fields: usize,
    },
    Unrecoverable { reason: String },
}

impl TolerantParse {
    pub fn headers(&self) -> Option<&[String]> {
        match self {
            TolerantParse::Clean { headers } | TolerantParse::Repaired { headers, .. } => {
                Some(headers)
            }
            TolerantParse::Unrecoverable { .. } => None,
        }
    }

    pub fn extra_fields(&self) -> usize {
        match self {
            TolerantParse::Repaired { extra_fields, .. } => *extra_fields,
            _ => 0,
        }
    }
}

/// Reads the header and first data row of `path` and classifies the layout.
///
/// I/O failures are errors; a file that opens but cannot be given a usable
/// header is [`TolerantParse::Unrecoverable`].
pub fn detect_layout(path: &Path, format: CsvFormat) -> Result<TolerantParse> {
    let mut reader = io_utils::open_csv_reader_from_path(path, format.delimiter, false)?;
    let mut record = ByteRecord::new();

    if !reader.read_byte_record(&mut record)? {
        return Ok(unrecoverable("file has no header row"));
    }
    let mut headers = match io_utils::decode_record(&record, format.encoding) {
        Ok(raw) => raw
            .iter()
            .map(|name| io_utils::normalize_column_name(name))
            .collect::<Vec<_>>(),
        Err(err) => return Ok(unrecoverable(format!("header cannot be decoded: {err}"))),
    };
    // A trailing delimiter on the header line names no column.
    let declared = headers.len();
    while headers.last().is_some_and(|name| name.is_empty()) {
        headers.pop();
    }
    let unnamed_tail = declared - headers.len();
    if headers.is_empty() {
        return Ok(unrecoverable("header names no columns"));
    }
    if let Some(position) = headers.iter().position(|name| name.is_empty()) {
        return Ok(unrecoverable(format!(
            "header column {} has an empty name",
            position + 1
        )));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = headers.iter().find(|name| !seen.insert(name.as_str())) {
        return Ok(unrecoverable(format!(
            "header repeats column '{duplicate}'"
        )));
    }

    let row_extra = if reader.read_byte_record(&mut record)? {
        record.len().saturating_sub(headers.len())
    } else {
        0
    };
    let extra_fields = row_extra.max(unnamed_tail);
    if extra_fields > 0 {
        Ok(TolerantParse::Repaired {
            headers,
            extra_fields,
        })
    } else {
        Ok(TolerantParse::Clean { headers })
    }
}

fn unrecoverable(reason: impl Into<String>) -> TolerantParse {
    TolerantParse::Unrecoverable {
        reason: reason.into(),
    }
}

/// Streams data rows of a file whose layout has been detected.
pub struct TolerantReader {
    reader: csv::Reader<BufReader<File>>,
    record: ByteRecord,
    encoding: &'static Encoding,
    width: usize,
    repaired: bool,
}

impl TolerantReader {
    pub fn open(path: &Path, format: CsvFormat, layout: &TolerantParse) -> Result<Self> {
        let (width, repaired) = match layout {
            TolerantParse::Clean { headers } => (headers.len(), false),
            TolerantParse::Repaired { headers, .. } => (headers.len(), true),
            TolerantParse::Unrecoverable { reason } => {
                bail!("{path:?} cannot be parsed: {reason}")
            }
        };
        let reader = io_utils::open_csv_reader_from_path(path, format.delimiter, true)?;
        Ok(Self {
            reader,
            record: ByteRecord::new(),
            encoding: format.encoding,
            width,
            repaired,
        })
    }

    /// Next data row, exactly as wide as the header.
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        if !self.reader.read_byte_record(&mut self.record)? {
            return Ok(None);
        }
        let line = self.record.position().map_or(0, |pos| pos.line());
        let fields = self.record.len();
        if fields > self.width && !self.repaired {
            bail!(
                "Row on line {line} has {fields} fields but the header declares {}",
                self.width
            );
        }
        let mut row = Vec::with_capacity(self.width);
        for field in self.record.iter().take(self.width) {
            row.push(io_utils::decode_bytes(field, self.encoding)?);
        }
        row.resize(self.width, String::new());
        Ok(Some(row))
    }
}
