//! Stage wiring over a corpus directory.
//!
//! Each function here is one command of the tool: it discovers the files,
//! fans the per-file work out through [`dispatch`], and folds the results into
//! a [`RunReport`]. Run-level failures (unreadable header, empty corpus, bad
//! table shape) come back as errors; per-file failures live in the report.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use log::{debug, info, warn};

use crate::{
    dispatch::{WorkerLimit, dispatch},
    error::PipelineError,
    header::scan_headers,
    io_utils,
    load::{BulkLoader, LoadOptions},
    normalize::normalize_file,
    parse::CsvFormat,
    profile::{FileProfile, merge_profiles, profile_file},
    report::{FileOutcome, RunReport, Stage},
    schema::{CanonicalSchema, MANIFEST_FILE_NAME, TypeOverrides, unify},
    scrub::scrub_file,
    sink::RelationalSink,
};

/// Settings shared by every corpus-level stage.
#[derive(Debug, Clone, Copy)]
pub struct CorpusOptions {
    pub format: CsvFormat,
    pub limit: WorkerLimit,
}

#[derive(Debug, Clone)]
pub struct SchemaDiscovery {
    pub schema: CanonicalSchema,
    pub profile_report: RunReport,
}

#[derive(Debug, Clone)]
pub struct UnifySummary {
    pub schema: CanonicalSchema,
    pub manifest: PathBuf,
    /// One entry per input file; files that failed profiling appear as failures.
    pub report: RunReport,
}

pub fn corpus_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let files = io_utils::list_csv_files(input_dir)?;
    if files.is_empty() {
        return Err(PipelineError::EmptyCorpus(input_dir.to_path_buf()).into());
    }
    Ok(files)
}

pub fn scrub_corpus(input_dir: &Path, limit: WorkerLimit) -> Result<RunReport> {
    let files = corpus_files(input_dir)?;
    let outcomes = dispatch(Stage::Scrub, &files, limit, scrub_file)?
        .into_iter()
        .map(|(path, result)| match result {
            Ok(stats) => {
                let outcome = FileOutcome::succeeded(&path, stats.lines_kept);
                if stats.changed() {
                    outcome.with_note(format!(
                        "removed {} carriage return(s), {} blank line(s)",
                        stats.carriage_returns_removed, stats.blank_lines_removed
                    ))
                } else {
                    outcome
                }
            }
            Err(err) => FileOutcome::failed(&path, &err),
        })
        .collect();
    Ok(RunReport::new(Stage::Scrub, outcomes))
}

/// Scans headers, unifies them, and resolves column types from a full
/// profile of the corpus.
pub fn discover_schema(
    input_dir: &Path,
    overrides: &TypeOverrides,
    options: CorpusOptions,
) -> Result<SchemaDiscovery> {
    let files = corpus_files(input_dir)?;
    let headers = scan_headers(&files, options.format)?;
    let mut schema = unify(&headers, overrides);
    info!(
        "Unified {} file header(s) into {} canonical column(s)",
        headers.len(),
        schema.columns.len()
    );

    let format = options.format;
    let results = dispatch(Stage::Profile, &files, options.limit, |path| {
        profile_file(path, format)
    })?;
    let mut profiles: Vec<FileProfile> = Vec::with_capacity(results.len());
    let mut outcomes = Vec::with_capacity(results.len());
    for (path, result) in results {
        match result {
            Ok(profile) => {
                let mut outcome = FileOutcome::succeeded(&path, profile.rows);
                if profile.extra_fields > 0 {
                    outcome = outcome.with_note(format!(
                        "dropped {} trailing field(s) per row",
                        profile.extra_fields
                    ));
                }
                outcomes.push(outcome);
                profiles.push(profile);
            }
            Err(err) => outcomes.push(FileOutcome::failed(&path, &err)),
        }
    }
    let corpus = merge_profiles(&profiles);
    schema.resolve_types(&corpus);

    Ok(SchemaDiscovery {
        schema,
        profile_report: RunReport::new(Stage::Profile, outcomes),
    })
}

/// Normalizes every profiled file into `output_dir` and writes the manifest.
pub fn unify_corpus(
    input_dir: &Path,
    output_dir: &Path,
    overrides: &TypeOverrides,
    options: CorpusOptions,
) -> Result<UnifySummary> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating output directory {output_dir:?}"))?;
    let same_dir = fs::canonicalize(input_dir)
        .and_then(|input| fs::canonicalize(output_dir).map(|output| input == output))
        .with_context(|| format!("Resolving {input_dir:?} and {output_dir:?}"))?;
    ensure!(
        !same_dir,
        "Output directory {output_dir:?} must differ from the input directory"
    );
    clear_outputs(output_dir)?;

    let SchemaDiscovery {
        schema,
        profile_report,
    } = discover_schema(input_dir, overrides, options)?;
    let profiled = profile_report.succeeded_paths();

    let format = options.format;
    let normalized = dispatch(Stage::Normalize, &profiled, options.limit, |path| {
        normalize_file(path, &schema, output_dir, format)
    })?;
    let mut normalized = normalized.into_iter();

    let mut outcomes = Vec::with_capacity(profile_report.total());
    for profiled_outcome in &profile_report.outcomes {
        if !profiled_outcome.is_success() {
            outcomes.push(profiled_outcome.clone());
            continue;
        }
        let Some((path, result)) = normalized.next() else {
            break;
        };
        let outcome = match result {
            Ok(file) => {
                let mut notes = Vec::new();
                if !file.filled_columns.is_empty() {
                    notes.push(format!("filled {} column(s)", file.filled_columns.len()));
                }
                if file.extra_fields > 0 {
                    notes.push(format!("dropped {} trailing field(s)", file.extra_fields));
                }
                let outcome = FileOutcome::succeeded(&path, file.rows);
                if notes.is_empty() {
                    outcome
                } else {
                    outcome.with_note(notes.join("; "))
                }
            }
            Err(err) => FileOutcome::failed(&path, &err),
        };
        outcomes.push(outcome);
    }

    let manifest = output_dir.join(MANIFEST_FILE_NAME);
    schema
        .save(&manifest)
        .with_context(|| format!("Writing schema manifest {manifest:?}"))?;
    info!("Canonical schema written to {manifest:?}");

    Ok(UnifySummary {
        schema,
        manifest,
        report: RunReport::new(Stage::Normalize, outcomes),
    })
}

/// Removes normalized files and the manifest left by an earlier run, so the
/// output directory only ever holds what this run produced.
fn clear_outputs(output_dir: &Path) -> Result<()> {
    let mut stale = io_utils::list_csv_files(output_dir)?;
    let manifest = output_dir.join(MANIFEST_FILE_NAME);
    if manifest.is_file() {
        stale.push(manifest);
    }
    for path in &stale {
        debug!("Removing previous output {path:?}");
        fs::remove_file(path).with_context(|| format!("Removing previous output {path:?}"))?;
    }
    if !stale.is_empty() {
        info!(
            "Cleared {} previous output file(s) from {output_dir:?}",
            stale.len()
        );
    }
    Ok(())
}

/// Loads every normalized file of `normalized_dir`, using its manifest for
/// column types when one is present and readable.
pub fn load_corpus(
    normalized_dir: &Path,
    sink: &mut dyn RelationalSink,
    options: LoadOptions,
    overrides: &TypeOverrides,
) -> Result<RunReport> {
    let files = corpus_files(normalized_dir)?;
    let manifest_path = normalized_dir.join(MANIFEST_FILE_NAME);
    let manifest = if manifest_path.is_file() {
        match CanonicalSchema::load(&manifest_path) {
            Ok(schema) => Some(schema),
            Err(err) => {
                warn!("Ignoring unreadable schema manifest: {err:#}");
                None
            }
        }
    } else {
        None
    };
    BulkLoader::new(sink, options).load(&files, manifest.as_ref(), overrides)
}
