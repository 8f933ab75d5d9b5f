pub mod cli;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod header;
pub mod index;
pub mod io_utils;
pub mod load;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod schema;
pub mod scrub;
pub mod sink;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, GlobalArgs, TargetArgs},
    config::PipelineConfig,
    load::LoadOptions,
    pipeline::CorpusOptions,
    sink::PostgresSink,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_unify", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut config = PipelineConfig::load_or_default(cli.global.config.as_deref())?;
    apply_global_overrides(&mut config, &cli.global);
    debug!("Effective configuration: {config:?}");
    match cli.command {
        Commands::Scrub(args) => handle_scrub(&args, &config),
        Commands::Schema(args) => handle_schema(&args, &config),
        Commands::Unify(args) => handle_unify(&args, &config),
        Commands::Load(args) => {
            apply_target_overrides(&mut config, &args.target);
            handle_load(&args, &config)
        }
        Commands::Index(args) => {
            apply_target_overrides(&mut config, &args.target);
            handle_index(&args, &config)
        }
    }
}

fn apply_global_overrides(config: &mut PipelineConfig, global: &GlobalArgs) {
    if let Some(max_workers) = global.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(delimiter) = global.delimiter {
        config.delimiter = (delimiter as char).to_string();
    }
    if let Some(encoding) = &global.input_encoding {
        config.input_encoding = Some(encoding.clone());
    }
}

fn apply_target_overrides(config: &mut PipelineConfig, target: &TargetArgs) {
    if let Some(table) = &target.table {
        config.table = table.clone();
    }
    if let Some(host) = &target.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = target.port {
        config.connection.port = port;
    }
    if let Some(user) = &target.user {
        config.connection.user = user.clone();
    }
    if let Some(database) = &target.database {
        config.connection.database = database.clone();
    }
}

fn corpus_options(config: &PipelineConfig) -> Result<CorpusOptions> {
    Ok(CorpusOptions {
        format: config.csv_format()?,
        limit: config.worker_limit(),
    })
}

fn handle_scrub(args: &cli::ScrubArgs, config: &PipelineConfig) -> Result<()> {
    info!("Scrubbing CSV files in {:?}", args.input);
    let report = pipeline::scrub_corpus(&args.input, config.worker_limit())?;
    print!("{}", report.render());
    report.verdict()?;
    Ok(())
}

fn handle_schema(args: &cli::SchemaArgs, config: &PipelineConfig) -> Result<()> {
    let format = config.csv_format()?;
    info!(
        "Discovering canonical schema of {:?} with delimiter '{}'",
        args.input,
        printable_delimiter(format.delimiter)
    );
    let discovery =
        pipeline::discover_schema(&args.input, &config.type_overrides, corpus_options(config)?)?;
    let schema = &discovery.schema;
    let headers = vec![
        "column".to_string(),
        "type".to_string(),
        "source".to_string(),
    ];
    let rows = schema
        .columns
        .iter()
        .map(|column| {
            let resolved = schema
                .column_type(column)
                .map(|ty| ty.to_string())
                .unwrap_or_default();
            let source = match schema.overrides.get(column) {
                Some(ty) if Some(ty) == schema.column_type(column) => "override",
                Some(_) => "override (coerced)",
                None => "inferred",
            };
            vec![column.clone(), resolved, source.to_string()]
        })
        .collect::<Vec<_>>();
    print!("{}", discovery.profile_report.render());
    println!();
    print!("{}", table::render_table(&headers, &rows));
    if let Some(path) = &args.output {
        schema
            .save(path)
            .with_context(|| format!("Writing canonical schema to {path:?}"))?;
        info!(
            "Canonical schema for {} column(s) written to {path:?}",
            schema.columns.len()
        );
    }
    discovery.profile_report.verdict()?;
    Ok(())
}

fn handle_unify(args: &cli::UnifyArgs, config: &PipelineConfig) -> Result<()> {
    info!("Normalizing {:?} into {:?}", args.input, args.output);
    let summary = pipeline::unify_corpus(
        &args.input,
        &args.output,
        &config.type_overrides,
        corpus_options(config)?,
    )?;
    print!("{}", summary.report.render());
    summary.report.verdict()?;
    Ok(())
}

fn handle_load(args: &cli::LoadArgs, config: &PipelineConfig) -> Result<()> {
    info!(
        "Loading {:?} into table {} at {}",
        args.input,
        config.table,
        config.connection.describe()
    );
    let mut sink = PostgresSink::connect(&config.connection)?;
    let options = LoadOptions {
        table: config.table.clone(),
        drop_existing: args.drop_existing,
    };
    let report = pipeline::load_corpus(&args.input, &mut sink, options, &config.type_overrides)?;
    print!("{}", report.render());
    report.verdict()?;
    Ok(())
}

fn handle_index(args: &cli::IndexArgs, config: &PipelineConfig) -> Result<()> {
    let columns = if args.columns.is_empty() {
        config.index_columns()
    } else {
        args.columns
            .iter()
            .map(|c| io_utils::normalize_column_name(c))
            .filter(|c| !c.is_empty())
            .collect()
    };
    debug!("Index columns: {columns:?}");
    let mut sink = PostgresSink::connect(&config.connection)?;
    let report = index::build_indices(&mut sink, &config.table, &columns);
    print!("{}", report.render());
    info!(
        "Created {} of {} index(es) on {}",
        report.created(),
        report.outcomes.len(),
        report.table
    );
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
