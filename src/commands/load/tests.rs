use std::sync::Arc;

use arrow::array::{ListBuilder, StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rusqlite::Connection;
use tempfile::TempDir;

use super::checkpoint::{Checkpoint, CheckpointStore, Stream};
use super::stage::{RowOutcome, SkipReason};
use super::*;
use crate::model::{CodeLinkRecord, DatasetRecord, EvalRecord, PaperRecord};

fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    db_setup::ensure_schema(&conn).unwrap();
    conn
}

fn test_store(dir: &TempDir) -> CheckpointStore {
    CheckpointStore::new(dir.path().join(".load_checkpoint.json"))
}

fn paper(arxiv_id: Option<&str>, title: &str) -> PaperRecord {
    PaperRecord {
        title: Some(title.to_string()),
        arxiv_id: arxiv_id.map(ToOwned::to_owned),
        ..PaperRecord::default()
    }
}

fn dataset(name: &str) -> DatasetRecord {
    DatasetRecord {
        name: Some(name.to_string()),
        description: Some(format!("{name} description")),
        ..DatasetRecord::default()
    }
}

fn link(arxiv_id: &str, repo_url: &str) -> CodeLinkRecord {
    CodeLinkRecord {
        paper_arxiv_id: Some(arxiv_id.to_string()),
        repo_url: Some(repo_url.to_string()),
        framework: Some("pytorch".to_string()),
        is_official: Some(true),
    }
}

fn eval(dataset: &str, task: &str, metric: &str, value: &str, arxiv_id: &str) -> EvalRecord {
    EvalRecord {
        dataset: Some(dataset.to_string()),
        task: Some(task.to_string()),
        metric: Some(metric.to_string()),
        value: Some(value.to_string()),
        paper_arxiv_id: Some(arxiv_id.to_string()),
    }
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn papers_stream_counts_missing_and_duplicate_keys() {
    let mut conn = test_conn();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mut checkpoint = Checkpoint::default();

    let rows = vec![
        paper(Some("a1"), "P1"),
        paper(None, "P2"),
        paper(Some("a1"), "P1-dup"),
    ];

    let counts = papers::load(&mut conn, &rows, 1000, &mut checkpoint, &store).unwrap();

    assert_eq!(counts.inserted, 1);
    assert_eq!(counts.skipped, 2);
    assert_eq!(counts.skipped_missing_key, 1);
    assert_eq!(counts.skipped_duplicate, 1);
    assert_eq!(counts.processed(), rows.len());
    assert_eq!(checkpoint.offset(Stream::Papers), 3);
    assert!(checkpoint.is_complete(Stream::Papers));
    assert_eq!(store.load().unwrap(), checkpoint);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM papers"), 1);
}

#[test]
fn resume_processes_only_rows_at_or_after_offset() {
    let mut conn = test_conn();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mut checkpoint = Checkpoint::default();
    checkpoint.set_offset(Stream::Papers, 1000);

    let rows: Vec<usize> = (0..1500).collect();
    let mut seen = Vec::new();

    let counts = stage::run_batches(
        &mut conn,
        Stream::Papers,
        &rows,
        1000,
        &mut checkpoint,
        &store,
        |_tx, row| {
            seen.push(*row);
            Ok(RowOutcome::Inserted)
        },
    )
    .unwrap();

    assert_eq!(counts.inserted, 500);
    assert_eq!(seen.len(), 500);
    assert_eq!(seen.first(), Some(&1000));
    assert_eq!(seen.last(), Some(&1499));
    assert_eq!(checkpoint.offset(Stream::Papers), 1500);
    assert!(checkpoint.is_complete(Stream::Papers));
}

#[test]
fn complete_stream_is_a_noop() {
    let mut conn = test_conn();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mut checkpoint = Checkpoint::default();
    checkpoint.set_complete(Stream::Papers);

    let rows: Vec<usize> = (0..10).collect();
    let mut seen = 0_usize;

    let counts = stage::run_batches(
        &mut conn,
        Stream::Papers,
        &rows,
        4,
        &mut checkpoint,
        &store,
        |_tx, _row| {
            seen += 1;
            Ok(RowOutcome::Inserted)
        },
    )
    .unwrap();

    assert_eq!(seen, 0);
    assert_eq!(counts.processed(), 0);
    assert_eq!(checkpoint.offset(Stream::Papers), 0);
}

#[test]
fn row_errors_are_absorbed_and_counted() {
    let mut conn = test_conn();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mut checkpoint = Checkpoint::default();

    let rows: Vec<usize> = (0..10).collect();

    let counts = stage::run_batches(
        &mut conn,
        Stream::Papers,
        &rows,
        3,
        &mut checkpoint,
        &store,
        |_tx, row| {
            if *row == 5 {
                anyhow::bail!("boom");
            }
            Ok(RowOutcome::Inserted)
        },
    )
    .unwrap();

    assert_eq!(counts.inserted, 9);
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.skipped_error, 1);
    assert_eq!(counts.processed(), rows.len());
    assert!(checkpoint.is_complete(Stream::Papers));
}

#[test]
fn offset_is_persisted_after_every_batch() {
    let mut conn = test_conn();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mut checkpoint = Checkpoint::default();

    let rows: Vec<usize> = (0..1500).collect();
    let mut offsets_on_disk = Vec::new();

    stage::run_batches(
        &mut conn,
        Stream::Papers,
        &rows,
        1000,
        &mut checkpoint,
        &store,
        |_tx, row| {
            // the batch containing row 0 commits before row 1000 is reached
            if *row == 1000 {
                offsets_on_disk.push(store.load().unwrap().offset(Stream::Papers));
            }
            Ok(RowOutcome::Inserted)
        },
    )
    .unwrap();

    assert_eq!(offsets_on_disk, vec![1000]);
    assert_eq!(store.load().unwrap().offset(Stream::Papers), 1500);
}

#[test]
fn rerunning_all_streams_inserts_nothing_new() {
    let mut conn = test_conn();
    let dir = TempDir::new().unwrap();

    let papers_rows = vec![paper(Some("a1"), "P1"), paper(Some("a2"), "P2")];
    let datasets_rows = vec![dataset("ImageNet"), dataset("CIFAR-10")];
    let links_rows = vec![link("a1", "https://github.com/org/repo")];
    let eval_rows = vec![eval("ImageNet", "Image Classification", "Top-1", "81.2", "a1")];

    let store1 = CheckpointStore::new(dir.path().join("cp-first.json"));
    let mut cp1 = Checkpoint::default();
    let p1 = papers::load(&mut conn, &papers_rows, 1000, &mut cp1, &store1).unwrap();
    let d1 = datasets::load(&mut conn, &datasets_rows, 1000, &mut cp1, &store1).unwrap();
    let l1 = links::load(&mut conn, &links_rows, 1000, &mut cp1, &store1).unwrap();
    let (e1, b1) = evaluation::load(&mut conn, &eval_rows, 1000, &mut cp1, &store1).unwrap();

    assert_eq!(p1.inserted, 2);
    assert_eq!(d1.inserted, 2);
    assert_eq!(l1.inserted, 1);
    assert_eq!(e1.inserted, 1);
    assert_eq!(b1, 1);
    assert!(cp1.all_complete());

    let store2 = CheckpointStore::new(dir.path().join("cp-second.json"));
    let mut cp2 = Checkpoint::default();
    let p2 = papers::load(&mut conn, &papers_rows, 1000, &mut cp2, &store2).unwrap();
    let d2 = datasets::load(&mut conn, &datasets_rows, 1000, &mut cp2, &store2).unwrap();
    let l2 = links::load(&mut conn, &links_rows, 1000, &mut cp2, &store2).unwrap();
    let (e2, b2) = evaluation::load(&mut conn, &eval_rows, 1000, &mut cp2, &store2).unwrap();

    assert_eq!(p2.inserted, 0);
    assert_eq!(p2.skipped_duplicate, 2);
    assert_eq!(d2.inserted, 0);
    assert_eq!(d2.skipped_duplicate, 2);
    assert_eq!(l2.inserted, 0);
    assert_eq!(l2.skipped_duplicate, 1);
    assert_eq!(e2.inserted, 0);
    assert_eq!(e2.skipped_duplicate, 1);
    assert_eq!(b2, 1);

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM papers"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM datasets"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM implementations"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM benchmarks"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM benchmark_results"), 1);
}

#[test]
fn link_for_unknown_paper_is_skipped() {
    let mut conn = test_conn();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mut checkpoint = Checkpoint::default();

    let rows = vec![
        link("missing", "https://github.com/org/repo"),
        CodeLinkRecord {
            paper_arxiv_id: None,
            repo_url: Some("https://github.com/org/other".to_string()),
            ..CodeLinkRecord::default()
        },
    ];

    let counts = links::load(&mut conn, &rows, 1000, &mut checkpoint, &store).unwrap();

    assert_eq!(counts.inserted, 0);
    assert_eq!(counts.skipped_missing_referent, 1);
    assert_eq!(counts.skipped_missing_key, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM implementations"), 0);
}

#[test]
fn eval_row_without_known_dataset_is_skipped_entirely() {
    let mut conn = test_conn();
    let tx = conn.transaction().unwrap();

    let row = eval("Unknown", "Task", "Top-1", "1.0", "a1");
    let mut benchmarks = 0;
    let outcome = evaluation::insert_eval(&tx, &row, &mut benchmarks).unwrap();
    tx.commit().unwrap();

    assert_eq!(outcome, RowOutcome::Skipped(SkipReason::MissingReferent));
    assert_eq!(benchmarks, 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM benchmarks"), 0);
}

#[test]
fn benchmark_task_updates_in_place_but_result_values_never_change() {
    let mut conn = test_conn();
    conn.execute(
        "INSERT INTO papers (title, arxiv_id) VALUES ('P1', 'a1')",
        [],
    )
    .unwrap();
    conn.execute("INSERT INTO datasets (name) VALUES ('ImageNet')", [])
        .unwrap();

    let mut benchmarks = 0;

    let tx = conn.transaction().unwrap();
    let first = eval("ImageNet", "Old Task", "Top-1", "81.2", "a1");
    assert_eq!(
        evaluation::insert_eval(&tx, &first, &mut benchmarks).unwrap(),
        RowOutcome::Inserted
    );
    tx.commit().unwrap();

    let tx = conn.transaction().unwrap();
    let second = eval("ImageNet", "New Task", "Top-1", "99.9", "a1");
    assert_eq!(
        evaluation::insert_eval(&tx, &second, &mut benchmarks).unwrap(),
        RowOutcome::Skipped(SkipReason::Duplicate)
    );
    tx.commit().unwrap();

    assert_eq!(benchmarks, 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM benchmarks"), 1);

    let task: String = conn
        .query_row("SELECT task FROM benchmarks LIMIT 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(task, "New Task");

    let value: f64 = conn
        .query_row(
            "SELECT metric_value FROM benchmark_results LIMIT 1",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert!((value - 81.2).abs() < f64::EPSILON);
}

#[test]
fn non_numeric_metric_values_are_skipped_as_bad_values() {
    let mut conn = test_conn();
    conn.execute(
        "INSERT INTO papers (title, arxiv_id) VALUES ('P1', 'a1')",
        [],
    )
    .unwrap();
    conn.execute("INSERT INTO datasets (name) VALUES ('ImageNet')", [])
        .unwrap();

    let mut benchmarks = 0;
    let tx = conn.transaction().unwrap();
    let row = eval("ImageNet", "Task", "Top-1", "best", "a1");
    let outcome = evaluation::insert_eval(&tx, &row, &mut benchmarks).unwrap();
    tx.commit().unwrap();

    assert_eq!(outcome, RowOutcome::Skipped(SkipReason::BadValue));
    // the benchmark upsert still happened
    assert_eq!(benchmarks, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM benchmarks"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM benchmark_results"), 0);
}

#[test]
fn checkpoint_clears_only_after_every_stream_completes() {
    let mut conn = test_conn();
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mut checkpoint = Checkpoint::default();

    papers::load(
        &mut conn,
        &[paper(Some("a1"), "P1")],
        1000,
        &mut checkpoint,
        &store,
    )
    .unwrap();
    assert!(!checkpoint.all_complete());

    datasets::load(&mut conn, &[dataset("D")], 1000, &mut checkpoint, &store).unwrap();
    links::load(&mut conn, &[], 1000, &mut checkpoint, &store).unwrap();
    evaluation::load(&mut conn, &[], 1000, &mut checkpoint, &store).unwrap();

    assert!(checkpoint.all_complete());
    assert!(store.exists());
    store.clear().unwrap();
    assert!(!store.exists());
    assert_eq!(store.load().unwrap(), Checkpoint::default());
}

#[test]
fn published_dates_parse_or_become_absent() {
    assert_eq!(
        papers::parse_published_date("2020-01-31"),
        chrono::NaiveDate::from_ymd_opt(2020, 1, 31)
    );
    assert_eq!(
        papers::parse_published_date(" 2020-01-31 "),
        chrono::NaiveDate::from_ymd_opt(2020, 1, 31)
    );
    assert_eq!(papers::parse_published_date("January 2020"), None);
    assert_eq!(papers::parse_published_date(""), None);
}

#[test]
fn metric_values_parse_only_when_finite_numbers() {
    assert_eq!(evaluation::parse_metric_value("81.2"), Some(81.2));
    assert_eq!(evaluation::parse_metric_value(" 0.5 "), Some(0.5));
    assert_eq!(evaluation::parse_metric_value("N/A"), None);
    assert_eq!(evaluation::parse_metric_value("inf"), None);
    assert_eq!(evaluation::parse_metric_value("nan"), None);
}

#[test]
fn parquet_papers_decode_handles_nulls_and_lists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("train.parquet");

    let schema = Arc::new(Schema::new(vec![
        Field::new("title", DataType::Utf8, true),
        Field::new("abstract", DataType::Utf8, true),
        Field::new("arxiv_id", DataType::Utf8, true),
        Field::new("url_abs", DataType::Utf8, true),
        Field::new("url_pdf", DataType::Utf8, true),
        Field::new("date", DataType::Utf8, true),
        Field::new(
            "authors",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            true,
        ),
    ]));

    let mut authors = ListBuilder::new(StringBuilder::new());
    authors.values().append_value("Ada Lovelace");
    authors.values().append_value("Alan Turing");
    authors.append(true);
    authors.append(false);

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec![Some("P1"), Some("P2")])),
            Arc::new(StringArray::from(vec![Some("About P1"), None])),
            Arc::new(StringArray::from(vec![Some("2001.00001"), None])),
            Arc::new(StringArray::from(vec![None::<&str>, None])),
            Arc::new(StringArray::from(vec![None::<&str>, None])),
            Arc::new(StringArray::from(vec![Some("2020-01-01"), None])),
            Arc::new(authors.finish()),
        ],
    )
    .unwrap();

    let file = std::fs::File::create(&path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let records = source::read_papers(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].arxiv_id.as_deref(), Some("2001.00001"));
    assert_eq!(records[0].date.as_deref(), Some("2020-01-01"));
    assert_eq!(
        records[0].authors.as_deref(),
        Some(["Ada Lovelace".to_string(), "Alan Turing".to_string()].as_slice())
    );
    assert!(records[1].arxiv_id.is_none());
    assert!(records[1].authors.is_none());
    assert!(records[1].date.is_none());
}
