use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

pub fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to set foreign_keys=ON")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS papers (
          id INTEGER PRIMARY KEY,
          title TEXT,
          abstract TEXT,
          arxiv_id TEXT NOT NULL UNIQUE,
          arxiv_url TEXT,
          pdf_url TEXT,
          published_date TEXT,
          authors TEXT
        );

        CREATE TABLE IF NOT EXISTS datasets (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE,
          description TEXT,
          modalities TEXT,
          homepage_url TEXT,
          paper_url TEXT
        );

        CREATE TABLE IF NOT EXISTS implementations (
          id INTEGER PRIMARY KEY,
          paper_id INTEGER NOT NULL,
          github_url TEXT NOT NULL,
          framework TEXT,
          is_official INTEGER NOT NULL DEFAULT 0,
          UNIQUE(paper_id, github_url),
          FOREIGN KEY(paper_id) REFERENCES papers(id)
        );

        CREATE TABLE IF NOT EXISTS benchmarks (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          dataset_id INTEGER NOT NULL,
          task TEXT,
          UNIQUE(name, dataset_id),
          FOREIGN KEY(dataset_id) REFERENCES datasets(id)
        );

        CREATE TABLE IF NOT EXISTS benchmark_results (
          id INTEGER PRIMARY KEY,
          paper_id INTEGER NOT NULL,
          benchmark_id INTEGER NOT NULL,
          metric_name TEXT NOT NULL,
          metric_value REAL NOT NULL,
          UNIQUE(paper_id, benchmark_id, metric_name),
          FOREIGN KEY(paper_id) REFERENCES papers(id),
          FOREIGN KEY(benchmark_id) REFERENCES benchmarks(id)
        );

        CREATE INDEX IF NOT EXISTS idx_implementations_paper ON implementations(paper_id);
        CREATE INDEX IF NOT EXISTS idx_benchmarks_dataset ON benchmarks(dataset_id);
        CREATE INDEX IF NOT EXISTS idx_benchmark_results_benchmark ON benchmark_results(benchmark_id);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}
