use anyhow::Result;
use rusqlite::{Connection, Transaction, params};

use super::checkpoint::{Checkpoint, CheckpointStore, Stream};
use super::stage::{self, RowOutcome, SkipReason, StageCounts};
use super::{key_field, lookup_dataset, lookup_paper};
use crate::model::EvalRecord;

/// Loads evaluation records. The benchmark upsert happens even when the
/// result row is later skipped, so benchmarks touched are tallied separately
/// from the stream's row outcomes.
pub fn load(
    conn: &mut Connection,
    rows: &[EvalRecord],
    batch_size: usize,
    checkpoint: &mut Checkpoint,
    store: &CheckpointStore,
) -> Result<(StageCounts, usize)> {
    let mut benchmarks_upserted = 0_usize;

    let counts = stage::run_batches(
        conn,
        Stream::Evaluation,
        rows,
        batch_size,
        checkpoint,
        store,
        |tx, row| insert_eval(tx, row, &mut benchmarks_upserted),
    )?;

    Ok((counts, benchmarks_upserted))
}

/// Benchmark `task` is updated in place on conflict; a result's
/// `metric_value` is never overwritten once inserted.
pub(super) fn insert_eval(
    tx: &Transaction,
    row: &EvalRecord,
    benchmarks_upserted: &mut usize,
) -> Result<RowOutcome> {
    let Some(dataset_name) = key_field(&row.dataset) else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingKey));
    };
    let Some(task) = key_field(&row.task) else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingKey));
    };

    let Some(dataset_id) = lookup_dataset(tx, dataset_name)? else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingReferent));
    };

    let benchmark_name = format!("{dataset_name} - {task}");
    let benchmark_id: i64 = tx.query_row(
        "INSERT INTO benchmarks (name, dataset_id, task)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(name, dataset_id) DO UPDATE SET task = excluded.task
         RETURNING id",
        params![benchmark_name, dataset_id, task],
        |r| r.get(0),
    )?;
    *benchmarks_upserted += 1;

    let Some(arxiv_id) = key_field(&row.paper_arxiv_id) else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingKey));
    };
    let Some(paper_id) = lookup_paper(tx, arxiv_id)? else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingReferent));
    };
    let Some(metric_name) = key_field(&row.metric) else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingKey));
    };
    let Some(metric_value) = row.value.as_deref().and_then(parse_metric_value) else {
        return Ok(RowOutcome::Skipped(SkipReason::BadValue));
    };

    let changed = tx.execute(
        "INSERT INTO benchmark_results (paper_id, benchmark_id, metric_name, metric_value)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(paper_id, benchmark_id, metric_name) DO NOTHING",
        params![paper_id, benchmark_id, metric_name, metric_value],
    )?;

    Ok(if changed == 0 {
        RowOutcome::Skipped(SkipReason::Duplicate)
    } else {
        RowOutcome::Inserted
    })
}

/// SQLite has no NaN, so only finite values are representable.
pub(super) fn parse_metric_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
