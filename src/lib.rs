pub mod cli;
pub mod dataset;
pub mod error;
pub mod history;
pub mod import;
pub mod mapping;
pub mod normalize;
pub mod profile;
pub mod store;
pub mod table;
pub mod workbook;

use std::{env, sync::OnceLock, time::Instant};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    cli::{Cli, Commands, HistoryArgs, ImportArgs, InputArgs, InspectArgs, MapArgs, SheetsArgs},
    dataset::Dataset,
    history::{HistoryLog, ImportRecord},
    import::ImportOptions,
    mapping::{ColumnMapping, suggest_mapping},
    normalize::{NormalizeOptions, RawFile, SheetSelection},
    store::Store,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tabload", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::Sheets(args) => handle_sheets(&args),
        Commands::Map(args) => handle_map(&args),
        Commands::Import(args) => handle_import(&args),
        Commands::History(args) => handle_history(&args),
    }
}

fn normalize_options(args: &InputArgs) -> NormalizeOptions {
    let sheet = if args.merge_sheets {
        SheetSelection::MergeAll
    } else if let Some(name) = &args.sheet {
        SheetSelection::Name(name.clone())
    } else {
        SheetSelection::First
    };
    NormalizeOptions {
        max_size: args.max_bytes,
        delimiter: args.delimiter,
        sheet,
    }
}

fn load_input(args: &InputArgs) -> Result<Dataset> {
    let raw = RawFile::from_path(&args.input)
        .with_context(|| format!("Reading input file {:?}", args.input))?;
    let dataset = normalize::normalize(&raw, &normalize_options(args))
        .with_context(|| format!("Normalizing {:?}", args.input))?;
    info!(
        "Normalized {:?}: {} row(s), {} column(s)",
        args.input,
        dataset.row_count(),
        dataset.column_count()
    );
    Ok(dataset)
}

fn handle_inspect(args: &InspectArgs) -> Result<()> {
    let dataset = load_input(&args.input)?;
    let profiles = profile::profile(&dataset);

    let headers = vec![
        "column".to_string(),
        "type".to_string(),
        "nulls".to_string(),
        "null_pct".to_string(),
        "distinct".to_string(),
    ];
    let rows = profiles
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.kind.as_str().to_string(),
                p.null_count.to_string(),
                format!("{:.1}", p.null_percent),
                p.distinct_count.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_sheets(args: &SheetsArgs) -> Result<()> {
    let raw = RawFile::from_path(&args.input)
        .with_context(|| format!("Reading input file {:?}", args.input))?;
    let names =
        normalize::sheet_names(&raw).with_context(|| format!("Listing sheets in {:?}", args.input))?;
    for name in &names {
        println!("{name}");
    }
    info!("{} sheet(s) in {:?}", names.len(), args.input);
    Ok(())
}

fn handle_map(args: &MapArgs) -> Result<()> {
    let dataset = load_input(&args.input)?;
    let store = Store::open(&args.db);
    if !store.table_exists(&args.table)? {
        return Err(anyhow!("Table '{}' does not exist in {:?}", args.table, args.db));
    }
    let target_columns: Vec<String> = store
        .table_columns(&args.table)?
        .into_iter()
        .map(|c| c.name)
        .collect();
    let mapping = suggest_mapping(&dataset.columns, &target_columns);

    let headers = vec!["source".to_string(), "target".to_string()];
    let rows = dataset
        .columns
        .iter()
        .map(|source| {
            vec![
                source.clone(),
                mapping.get(source).unwrap_or("(skip)").to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);

    if let Some(path) = &args.output {
        mapping.save(path)?;
        info!("Wrote mapping to {path:?}");
    }
    Ok(())
}

fn handle_import(args: &ImportArgs) -> Result<()> {
    let dataset = load_input(&args.input)?;
    let store = Store::open(&args.db);

    let mapping = resolve_mapping(args, &store, &dataset)?;
    let mapped = mapping.mapped_pairs().len();
    info!("Mapping covers {mapped} of {} column(s)", dataset.column_count());

    let options = ImportOptions {
        if_exists: args.if_exists,
        batch_size: args.batch_size,
        validate_before_import: args.validate,
        create_table: args.create_table,
    };

    let filename = args
        .input
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.input.display().to_string());
    let started = Instant::now();
    let result = import::import(&store, &dataset, &args.table, &mapping, &options);

    let record = match &result {
        Ok(outcome) => {
            ImportRecord::success(&filename, &args.table, outcome.rows_affected, outcome.duration)
        }
        Err(_) => ImportRecord::failure(&filename, &args.table, started.elapsed()),
    };
    // History is best-effort bookkeeping; a persistence failure must not
    // mask the import result.
    if let Some(path) = &args.history {
        if let Err(err) = append_history(path, record) {
            warn!("could not update history file {path:?}: {err:#}");
        }
    }

    let outcome = result.with_context(|| format!("Importing into table '{}'", args.table))?;
    info!(
        "✓ Imported {} row(s) into '{}' in {} batch(es) ({:?})",
        outcome.rows_affected, args.table, outcome.batches, outcome.duration
    );
    Ok(())
}

fn append_history(path: &std::path::Path, record: ImportRecord) -> Result<()> {
    let mut log = HistoryLog::load_or_default(path)?;
    log.append(record);
    log.save(path)
}

/// A mapping file wins; otherwise the suggestion runs against the live table
/// columns, or falls back to the identity mapping when the table is being
/// created from scratch.
fn resolve_mapping(args: &ImportArgs, store: &Store, dataset: &Dataset) -> Result<ColumnMapping> {
    if let Some(path) = &args.mapping {
        return ColumnMapping::load(path);
    }
    if store.table_exists(&args.table)? {
        let target_columns: Vec<String> = store
            .table_columns(&args.table)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        return Ok(suggest_mapping(&dataset.columns, &target_columns));
    }
    let mut mapping = ColumnMapping::new(&dataset.columns);
    for column in &dataset.columns {
        mapping.set(column, Some(column.clone()));
    }
    Ok(mapping)
}

fn handle_history(args: &HistoryArgs) -> Result<()> {
    let log = HistoryLog::load_or_default(&args.history)?;
    let headers = vec![
        "timestamp".to_string(),
        "file".to_string(),
        "table".to_string(),
        "rows".to_string(),
        "ok".to_string(),
        "ms".to_string(),
    ];
    let rows = log
        .records()
        .map(|r| {
            vec![
                r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.filename.clone(),
                r.table.clone(),
                r.rows_imported.to_string(),
                if r.success { "yes" } else { "no" }.to_string(),
                r.duration_ms.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!("{} record(s) in {:?}", log.len(), args.history);
    Ok(())
}
