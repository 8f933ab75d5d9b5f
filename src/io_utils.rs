//! I/O utilities shared by every stage.
//!
//! - **Corpus discovery**: [`list_csv_files`] returns the `*.csv` files of a
//!   directory sorted by name so repeated runs walk files in the same order.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//!   Normalized output is always UTF-8 because the sink reads it verbatim.
//! - **Reader/writer construction**: readers are flexible (ragged rows are
//!   handled by the tolerant parser, not rejected by `csv`); writers quote only
//!   when needed so an empty field stays an unquoted null for the sink.
//! - **Atomic replacement**: [`AtomicFile`] writes to a `.tmp` sibling and
//!   renames it into place on commit.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const TEMP_SUFFIX: &str = "tmp";

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Lists the `*.csv` files directly inside `dir`, sorted by file name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("Listing directory {dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Reading entry in {dir:?}"))?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
) -> Result<csv::Reader<BufReader<File>>> {
    let reader =
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?);
    Ok(open_csv_reader(reader, delimiter, has_headers))
}

pub fn open_csv_writer<W>(writer: W, delimiter: u8) -> csv::Writer<W>
where
    W: Write,
{
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Canonical form of a column name: trimmed and lowercased.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A file written beside its destination and moved into place on [`commit`].
///
/// Dropping without committing removes the temporary file, so an interrupted
/// writer never leaves a half-written destination behind.
///
/// [`commit`]: AtomicFile::commit
pub struct AtomicFile {
    destination: PathBuf,
    temp_path: PathBuf,
    writer: BufWriter<File>,
    committed: bool,
}

impl AtomicFile {
    pub fn create(destination: &Path) -> Result<Self> {
        let mut temp_name = destination
            .file_name()
            .ok_or_else(|| anyhow!("Destination {destination:?} has no file name"))?
            .to_os_string();
        temp_name.push(".");
        temp_name.push(TEMP_SUFFIX);
        let temp_path = destination.with_file_name(temp_name);
        let file = File::create(&temp_path)
            .with_context(|| format!("Creating temporary file {temp_path:?}"))?;
        Ok(Self {
            destination: destination.to_path_buf(),
            temp_path,
            writer: BufWriter::new(file),
            committed: false,
        })
    }

    pub fn writer(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    pub fn commit(mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Flushing {:?}", self.temp_path))?;
        fs::rename(&self.temp_path, &self.destination).with_context(|| {
            format!(
                "Moving {:?} into place at {:?}",
                self.temp_path, self.destination
            )
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
