use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, params};

use super::checkpoint::{Checkpoint, CheckpointStore, Stream};
use super::stage::{self, RowOutcome, SkipReason, StageCounts};
use super::key_field;
use crate::model::PaperRecord;

pub fn load(
    conn: &mut Connection,
    rows: &[PaperRecord],
    batch_size: usize,
    checkpoint: &mut Checkpoint,
    store: &CheckpointStore,
) -> Result<StageCounts> {
    stage::run_batches(
        conn,
        Stream::Papers,
        rows,
        batch_size,
        checkpoint,
        store,
        insert_paper,
    )
}

/// Papers without an arxiv id cannot be linked to later streams and are never
/// stored with a null key.
pub(super) fn insert_paper(tx: &Transaction, row: &PaperRecord) -> Result<RowOutcome> {
    let Some(arxiv_id) = key_field(&row.arxiv_id) else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingKey));
    };

    let published_date = row.date.as_deref().and_then(parse_published_date);
    let authors = row
        .authors
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let changed = tx.execute(
        "INSERT INTO papers (title, abstract, arxiv_id, arxiv_url, pdf_url, published_date, authors)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(arxiv_id) DO NOTHING",
        params![
            row.title,
            row.abstract_text,
            arxiv_id,
            row.url_abs,
            row.url_pdf,
            published_date,
            authors
        ],
    )?;

    Ok(if changed == 0 {
        RowOutcome::Skipped(SkipReason::Duplicate)
    } else {
        RowOutcome::Inserted
    })
}

/// Malformed dates become absent, not errors.
pub(super) fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
