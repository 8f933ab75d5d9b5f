//! Corpus-wide type profiling.
//!
//! Each file is scanned once and every column gets a [`ColumnProfile`]: which
//! types all of its non-null values satisfy, and how many nulls it holds.
//! Profiles merge by intersecting the candidate types, so the merged profile
//! describes the column across the whole corpus and every normalized file can
//! be given the same type for it.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result, bail};

use crate::{
    data::{is_null, parse_decimal, parse_integer, parse_timestamp},
    parse::{CsvFormat, TolerantParse, TolerantReader, detect_layout},
    schema::ColumnType,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnProfile {
    pub possible_integer: bool,
    pub possible_decimal: bool,
    pub possible_timestamp: bool,
    pub non_null: u64,
    pub nulls: u64,
    /// Number of profiled files carrying this column; set when merged.
    pub files_present: usize,
}

impl Default for ColumnProfile {
    fn default() -> Self {
        Self {
            possible_integer: true,
            possible_decimal: true,
            possible_timestamp: true,
            non_null: 0,
            nulls: 0,
            files_present: 0,
        }
    }
}

impl ColumnProfile {
    pub fn observe(&mut self, value: &str) {
        if is_null(value) {
            self.nulls += 1;
            return;
        }
        self.non_null += 1;
        if self.possible_integer && parse_integer(value).is_none() {
            self.possible_integer = false;
        }
        if self.possible_decimal && parse_decimal(value).is_none() {
            self.possible_decimal = false;
        }
        if self.possible_timestamp && parse_timestamp(value).is_err() {
            self.possible_timestamp = false;
        }
    }

    pub fn absorb(&mut self, other: &ColumnProfile) {
        self.possible_integer &= other.possible_integer;
        self.possible_decimal &= other.possible_decimal;
        self.possible_timestamp &= other.possible_timestamp;
        self.non_null += other.non_null;
        self.nulls += other.nulls;
    }

    /// Narrowest type that fits every observed value; `None` when nothing
    /// but nulls was seen.
    pub fn decide(&self) -> Option<ColumnType> {
        if self.non_null == 0 {
            None
        } else if self.possible_integer {
            Some(ColumnType::Integer)
        } else if self.possible_decimal {
            Some(ColumnType::Decimal)
        } else if self.possible_timestamp {
            Some(ColumnType::Timestamp)
        } else {
            Some(ColumnType::Text)
        }
    }
}

/// Profile of one file: columns in header order plus the repair applied.
#[derive(Debug, Clone)]
pub struct FileProfile {
    pub columns: Vec<(String, ColumnProfile)>,
    pub rows: u64,
    pub extra_fields: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CorpusProfile {
    columns: BTreeMap<String, ColumnProfile>,
    files: usize,
}

impl CorpusProfile {
    pub fn merge_file(&mut self, columns: &[(String, ColumnProfile)]) {
        self.files += 1;
        for (name, profile) in columns {
            let entry = self.columns.entry(name.clone()).or_default();
            entry.absorb(profile);
            entry.files_present += 1;
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.get(name)
    }

    pub fn files_profiled(&self) -> usize {
        self.files
    }
}

pub fn profile_file(path: &Path, format: CsvFormat) -> Result<FileProfile> {
    let layout = detect_layout(path, format)?;
    let headers = match &layout {
        TolerantParse::Unrecoverable { reason } => bail!("{path:?} cannot be parsed: {reason}"),
        other => other.headers().map(<[String]>::to_vec).unwrap_or_default(),
    };
    let mut profiles = vec![ColumnProfile::default(); headers.len()];
    let mut reader = TolerantReader::open(path, format, &layout)?;
    let mut rows = 0u64;
    while let Some(row) = reader
        .next_row()
        .with_context(|| format!("Profiling {path:?} after {rows} row(s)"))?
    {
        for (profile, value) in profiles.iter_mut().zip(&row) {
            profile.observe(value);
        }
        rows += 1;
    }
    Ok(FileProfile {
        columns: headers.into_iter().zip(profiles).collect(),
        rows,
        extra_fields: layout.extra_fields(),
    })
}

/// Intersects file profiles in the order given.
pub fn merge_profiles<'a>(files: impl IntoIterator<Item = &'a FileProfile>) -> CorpusProfile {
    let mut corpus = CorpusProfile::default();
    for file in files {
        corpus.merge_file(&file.columns);
    }
    corpus
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn decide_prefers_the_narrowest_type() {
        let mut ints = ColumnProfile::default();
        ints.observe("1");
        ints.observe("");
        assert_eq!(ints.decide(), Some(ColumnType::Integer));
        assert_eq!(ints.nulls, 1);

        let mut decimals = ints.clone();
        decimals.observe("2.75");
        assert_eq!(decimals.decide(), Some(ColumnType::Decimal));

        let mut stamps = ColumnProfile::default();
        stamps.observe("2015-03-01 10:00:00");
        assert_eq!(stamps.decide(), Some(ColumnType::Timestamp));

        let mut text = ColumnProfile::default();
        text.observe("N");
        assert_eq!(text.decide(), Some(ColumnType::Text));

        assert_eq!(ColumnProfile::default().decide(), None);
    }

    #[test]
    fn merging_intersects_candidates_across_files() {
        let mut first = ColumnProfile::default();
        first.observe("4");
        let mut second = ColumnProfile::default();
        second.observe("4.5");

        let mut corpus = CorpusProfile::default();
        corpus.merge_file(&[("fare".to_string(), first)]);
        corpus.merge_file(&[("fare".to_string(), second)]);

        let merged = corpus.column("fare").expect("fare profiled");
        assert_eq!(merged.decide(), Some(ColumnType::Decimal));
        assert_eq!(merged.files_present, 2);
        assert_eq!(corpus.files_profiled(), 2);
    }

    #[test]
    fn profile_file_counts_rows_and_repairs() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "ID,Flag\n1,N,,\n2,,,\n").unwrap();

        let profile = profile_file(file.path(), CsvFormat::default()).expect("profile");
        assert_eq!(profile.rows, 2);
        assert_eq!(profile.extra_fields, 2);
        assert_eq!(profile.columns[0].0, "id");
        assert_eq!(profile.columns[0].1.decide(), Some(ColumnType::Integer));
        assert_eq!(profile.columns[1].1.nulls, 1);
        assert_eq!(profile.columns[1].1.decide(), Some(ColumnType::Text));
    }
}
