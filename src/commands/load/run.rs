use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::cli::LoadArgs;
use crate::config::LoadConfig;
use crate::model::{LoadCounts, LoadPaths, LoadRunManifest, SourceFileEntry};
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

use super::checkpoint::{Checkpoint, CheckpointStore, Stream};
use super::{datasets, db_setup, evaluation, links, papers, source};

const MANIFEST_VERSION: u32 = 1;

const PAPERS_FILE: &str = "papers-with-abstracts/train.parquet";
const DATASETS_FILE: &str = "datasets/train.parquet";
const LINKS_FILE: &str = "links-between-paper-and-code/train.parquet";
const EVAL_FILE: &str = "evaluation-tables/train.parquet";

pub fn run(args: LoadArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("load-{}", utc_compact_string(started_ts));

    let config = LoadConfig::resolve(&args)?;
    let store = CheckpointStore::new(config.checkpoint_path.clone());

    if args.clear_checkpoint {
        store.clear()?;
        info!(path = %store.path().display(), "checkpoint cleared");
        return Ok(());
    }

    if args.fresh {
        store.clear()?;
        info!("starting fresh, previous checkpoint discarded");
    }

    let mut checkpoint = store.load()?;
    report_entry_mode(&checkpoint);

    install_interrupt_notice()?;

    info!(
        data_root = %config.data_root.display(),
        db_path = %config.db_path.display(),
        run_id = %run_id,
        "starting load"
    );

    let mut conn = Connection::open(&config.db_path)
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;
    db_setup::configure_connection(&conn)?;
    db_setup::ensure_schema(&conn)?;

    let (mut counts, sources) = match run_streams(&mut conn, &config, &store, &mut checkpoint) {
        Ok(result) => result,
        Err(err) => {
            error!(
                "load aborted; progress is saved at the last committed batch, \
                 rerun `pwcdb load` to resume"
            );
            return Err(err);
        }
    };

    counts.papers_total = query_count(&conn, "SELECT COUNT(*) FROM papers")?;
    counts.datasets_total = query_count(&conn, "SELECT COUNT(*) FROM datasets")?;
    counts.implementations_total = query_count(&conn, "SELECT COUNT(*) FROM implementations")?;
    counts.benchmarks_total = query_count(&conn, "SELECT COUNT(*) FROM benchmarks")?;
    counts.benchmark_results_total =
        query_count(&conn, "SELECT COUNT(*) FROM benchmark_results")?;

    let completed = checkpoint.all_complete();
    if completed {
        store.clear()?;
        info!("all streams loaded; checkpoint cleared");
    } else {
        info!(
            path = %store.path().display(),
            "load incomplete; checkpoint retained for resume"
        );
    }

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        config
            .data_root
            .join("manifests")
            .join(format!("load_run_{}.json", utc_compact_string(started_ts)))
    });

    let manifest = LoadRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: run_id.clone(),
        db_schema_version: db_setup::DB_SCHEMA_VERSION.to_string(),
        status: if completed { "completed" } else { "partial" }.to_string(),
        started_at,
        updated_at: now_utc_string(),
        batch_size: config.batch_size,
        paths: LoadPaths {
            data_root: config.data_root.display().to_string(),
            db_path: config.db_path.display().to_string(),
            checkpoint_path: config.checkpoint_path.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        sources,
        counts: counts.clone(),
        notes: vec![
            "Streams load in dependency order: papers, datasets, code links, evaluation."
                .to_string(),
            "Conflicting natural keys are counted as skipped duplicates, never errors."
                .to_string(),
        ],
    };
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote load run manifest");

    info!(
        papers_inserted = counts.papers_inserted,
        papers_skipped = counts.papers_skipped,
        datasets_inserted = counts.datasets_inserted,
        datasets_skipped = counts.datasets_skipped,
        links_inserted = counts.links_inserted,
        links_skipped = counts.links_skipped,
        eval_inserted = counts.eval_inserted,
        eval_skipped = counts.eval_skipped,
        benchmarks_upserted = counts.benchmarks_upserted,
        "load finished"
    );

    Ok(())
}

/// Stage order is the dependency order: later streams reference earlier ones
/// by natural key.
fn run_streams(
    conn: &mut Connection,
    config: &LoadConfig,
    store: &CheckpointStore,
    checkpoint: &mut Checkpoint,
) -> Result<(LoadCounts, Vec<SourceFileEntry>)> {
    let mut counts = LoadCounts::default();
    let mut sources = Vec::new();

    let papers_path = config.data_root.join(PAPERS_FILE);
    if checkpoint.is_complete(Stream::Papers) {
        info!(stream = "papers", "already loaded, skipping");
    } else if !papers_path.exists() {
        warn!(
            path = %papers_path.display(),
            "papers file not found; run the archive download for `papers`"
        );
    } else {
        let rows = source::read_papers(&papers_path)?;
        sources.push(source_entry(Stream::Papers, &papers_path, rows.len())?);
        let stage = papers::load(conn, &rows, config.batch_size, checkpoint, store)?;
        counts.papers_inserted = stage.inserted;
        counts.papers_skipped = stage.skipped;
    }

    let datasets_path = config.data_root.join(DATASETS_FILE);
    if checkpoint.is_complete(Stream::Datasets) {
        info!(stream = "datasets", "already loaded, skipping");
    } else if !datasets_path.exists() {
        warn!(
            path = %datasets_path.display(),
            "datasets file not found; run the archive download for `datasets`"
        );
    } else {
        let rows = source::read_datasets(&datasets_path)?;
        sources.push(source_entry(Stream::Datasets, &datasets_path, rows.len())?);
        let stage = datasets::load(conn, &rows, config.batch_size, checkpoint, store)?;
        counts.datasets_inserted = stage.inserted;
        counts.datasets_skipped = stage.skipped;
    }

    let links_path = config.data_root.join(LINKS_FILE);
    if checkpoint.is_complete(Stream::Links) {
        info!(stream = "links", "already loaded, skipping");
    } else if !links_path.exists() {
        warn!(
            path = %links_path.display(),
            "links file not found; run the archive download for `links`"
        );
    } else {
        let rows = source::read_links(&links_path)?;
        sources.push(source_entry(Stream::Links, &links_path, rows.len())?);
        let stage = links::load(conn, &rows, config.batch_size, checkpoint, store)?;
        counts.links_inserted = stage.inserted;
        counts.links_skipped = stage.skipped;
    }

    let eval_path = config.data_root.join(EVAL_FILE);
    if checkpoint.is_complete(Stream::Evaluation) {
        info!(stream = "evaluation", "already loaded, skipping");
    } else if !eval_path.exists() {
        warn!(
            path = %eval_path.display(),
            "evaluation file not found; run the archive download for `evaluation-tables`"
        );
    } else {
        let rows = source::read_eval(&eval_path)?;
        sources.push(source_entry(Stream::Evaluation, &eval_path, rows.len())?);
        let (stage, benchmarks_upserted) =
            evaluation::load(conn, &rows, config.batch_size, checkpoint, store)?;
        counts.eval_inserted = stage.inserted;
        counts.eval_skipped = stage.skipped;
        counts.benchmarks_upserted = benchmarks_upserted;
    }

    Ok((counts, sources))
}

fn source_entry(stream: Stream, path: &Path, rows: usize) -> Result<SourceFileEntry> {
    Ok(SourceFileEntry {
        stream: stream.as_str().to_string(),
        filename: path.display().to_string(),
        sha256: sha256_file(path)?,
        rows,
    })
}

fn report_entry_mode(checkpoint: &Checkpoint) {
    if !checkpoint.any_progress() {
        info!("no checkpoint found, starting full load");
        return;
    }

    info!("found existing checkpoint, resuming from last position");
    for stream in Stream::ALL {
        if checkpoint.is_complete(stream) {
            info!(stream = stream.as_str(), "complete");
        } else {
            info!(
                stream = stream.as_str(),
                resume_at = checkpoint.offset(stream),
                "resuming"
            );
        }
    }
}

/// The handler thread only reports; checkpoint saves happen on the main
/// thread after each batch commit, so exiting here loses at most the
/// in-flight batch.
fn install_interrupt_notice() -> Result<()> {
    ctrlc::set_handler(|| {
        eprintln!(
            "\ninterrupted; progress is saved at the last committed batch, \
             rerun `pwcdb load` to resume"
        );
        std::process::exit(130);
    })
    .context("failed to install interrupt handler")
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
