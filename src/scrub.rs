//! In-place line cleanup for raw downloads.
//!
//! Carriage returns are removed and whitespace-only lines dropped, so files
//! exported with Windows line endings or trailing blank lines read as plain
//! newline-delimited CSV.

use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use anyhow::{Context, Result};

use crate::io_utils::AtomicFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrubStats {
    pub lines_kept: u64,
    pub blank_lines_removed: u64,
    pub carriage_returns_removed: u64,
}

impl ScrubStats {
    pub fn changed(&self) -> bool {
        self.blank_lines_removed > 0 || self.carriage_returns_removed > 0
    }
}

/// Rewrites `path` in place. The file is replaced only once fully written.
pub fn scrub_file(path: &Path) -> Result<ScrubStats> {
    let file = File::open(path).with_context(|| format!("Opening {path:?}"))?;
    let mut reader = BufReader::new(file);
    let mut output = AtomicFile::create(path)?;
    let mut stats = ScrubStats::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Reading {path:?}"))?;
        if read == 0 {
            break;
        }
        let before = line.len();
        line.retain(|byte| *byte != b'\r');
        stats.carriage_returns_removed += (before - line.len()) as u64;
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            stats.blank_lines_removed += 1;
            continue;
        }
        line.push(b'\n');
        output
            .writer()
            .write_all(&line)
            .with_context(|| format!("Writing scrubbed copy of {path:?}"))?;
        stats.lines_kept += 1;
    }
    output.commit()?;
    Ok(stats)
}
