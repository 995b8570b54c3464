use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::cli::StreamArgs;
use crate::commands::load::{configure_connection, ensure_schema};
use crate::config::resolve_db_path;
use crate::model::EvalTableDoc;

const ERROR_LOG_CAP: usize = 5;
const DESCRIPTION_MAX_CHARS: usize = 500;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamTotals {
    pub rows_read: usize,
    pub datasets_upserted: usize,
    pub benchmarks_upserted: usize,
    pub errors: usize,
}

/// Streams a JSON-Lines evaluation-tables export straight into the store:
/// no materialized copy, no checkpoint, progress granularity is one commit
/// every `--commit-every` rows.
pub fn run(args: StreamArgs) -> Result<()> {
    if args.commit_every == 0 {
        bail!("--commit-every must be at least 1");
    }

    let db_path = resolve_db_path(&args.data_root, args.db_path.as_deref());

    info!(
        input = %args.input.display(),
        db_path = %db_path.display(),
        commit_every = args.commit_every,
        "streaming evaluation tables"
    );

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let reader = BufReader::new(file);

    let mut conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&conn)?;
    ensure_schema(&conn)?;

    let totals = stream_eval_tables(&mut conn, reader, args.commit_every)?;

    info!(
        rows = totals.rows_read,
        datasets = totals.datasets_upserted,
        benchmarks = totals.benchmarks_upserted,
        errors = totals.errors,
        "stream finished"
    );

    Ok(())
}

pub(crate) fn stream_eval_tables(
    conn: &mut Connection,
    reader: impl BufRead,
    commit_every: usize,
) -> Result<StreamTotals> {
    let mut totals = StreamTotals::default();
    let mut pending = 0_usize;

    let mut tx = conn.transaction()?;

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        totals.rows_read += 1;

        match process_doc(&tx, &line) {
            Ok((datasets, benchmarks)) => {
                totals.datasets_upserted += datasets;
                totals.benchmarks_upserted += benchmarks;
            }
            Err(err) => {
                totals.errors += 1;
                if totals.errors <= ERROR_LOG_CAP {
                    warn!(row = index, error = %err, "row failed, skipping");
                }
            }
        }

        pending += 1;
        if pending >= commit_every {
            tx.commit()?;
            tx = conn.transaction()?;
            pending = 0;
            info!(
                rows = totals.rows_read,
                benchmarks = totals.benchmarks_upserted,
                "progress"
            );
        }
    }

    tx.commit()?;

    if totals.errors > ERROR_LOG_CAP {
        warn!(
            errors = totals.errors,
            shown = ERROR_LOG_CAP,
            "additional row errors were not logged"
        );
    }

    Ok(totals)
}

/// One document may fan out into several datasets; each named dataset gets a
/// dataset upsert and a benchmark upsert sharing the bulk loader's naming.
fn process_doc(tx: &rusqlite::Transaction, line: &str) -> Result<(usize, usize)> {
    let doc: EvalTableDoc = serde_json::from_str(line).context("invalid document")?;

    let Some(task) = doc.task.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok((0, 0));
    };
    let description = doc
        .description
        .as_deref()
        .map(|d| truncate_chars(d, DESCRIPTION_MAX_CHARS));

    let mut datasets_upserted = 0;
    let mut benchmarks_upserted = 0;

    for entry in &doc.datasets {
        let Some(dataset_name) = entry
            .dataset
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        else {
            continue;
        };

        let inserted = tx.execute(
            "INSERT INTO datasets (name, description)
             VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING",
            params![dataset_name, description],
        )?;
        datasets_upserted += inserted;

        let dataset_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM datasets WHERE name = ?1 LIMIT 1",
                [dataset_name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(dataset_id) = dataset_id else {
            continue;
        };

        let benchmark_name = format!("{dataset_name} - {task}");
        let inserted = tx.execute(
            "INSERT INTO benchmarks (name, dataset_id, task)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name, dataset_id) DO NOTHING",
            params![benchmark_name, dataset_id, task],
        )?;
        benchmarks_upserted += inserted;
    }

    Ok((datasets_upserted, benchmarks_upserted))
}

fn truncate_chars(raw: &str, max_chars: usize) -> String {
    raw.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rusqlite::Connection;

    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn streams_documents_and_counts_errors() {
        let mut conn = test_conn();
        let input = concat!(
            r#"{"task": "Image Classification", "description": "d", "datasets": [{"dataset": "ImageNet"}, {"dataset": "CIFAR-10"}]}"#,
            "\n",
            "not json\n",
            r#"{"task": "Image Classification", "datasets": [{"dataset": "ImageNet"}]}"#,
            "\n",
        );

        let totals = stream_eval_tables(&mut conn, Cursor::new(input), 2).unwrap();

        assert_eq!(totals.rows_read, 3);
        assert_eq!(totals.errors, 1);
        assert_eq!(totals.datasets_upserted, 2);
        assert_eq!(totals.benchmarks_upserted, 2);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM datasets"), 2);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM benchmarks"), 2);
    }

    #[test]
    fn documents_without_task_or_datasets_upsert_nothing() {
        let mut conn = test_conn();
        let input = concat!(
            r#"{"description": "no task", "datasets": [{"dataset": "ImageNet"}]}"#,
            "\n",
            r#"{"task": "Detection", "datasets": []}"#,
            "\n",
            r#"{"task": "Detection", "datasets": [{"dataset": ""}]}"#,
            "\n",
        );

        let totals = stream_eval_tables(&mut conn, Cursor::new(input), 100).unwrap();

        assert_eq!(totals.rows_read, 3);
        assert_eq!(totals.errors, 0);
        assert_eq!(totals.datasets_upserted, 0);
        assert_eq!(totals.benchmarks_upserted, 0);
    }

    #[test]
    fn rerunning_the_stream_upserts_nothing_new() {
        let mut conn = test_conn();
        let doc = concat!(
            r#"{"task": "Detection", "description": "d", "datasets": [{"dataset": "COCO"}]}"#,
            "\n",
        );

        let first = stream_eval_tables(&mut conn, Cursor::new(doc), 100).unwrap();
        let second = stream_eval_tables(&mut conn, Cursor::new(doc), 100).unwrap();

        assert_eq!(first.datasets_upserted, 1);
        assert_eq!(first.benchmarks_upserted, 1);
        assert_eq!(second.datasets_upserted, 0);
        assert_eq!(second.benchmarks_upserted, 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM benchmarks"), 1);
    }

    #[test]
    fn descriptions_truncate_on_character_boundaries() {
        assert_eq!(truncate_chars("αβγδ", 2), "αβ");
        assert_eq!(truncate_chars("short", 500), "short");
    }
}
