use anyhow::Result;
use rusqlite::{Connection, Transaction, params};

use super::checkpoint::{Checkpoint, CheckpointStore, Stream};
use super::stage::{self, RowOutcome, SkipReason, StageCounts};
use super::{key_field, lookup_paper};
use crate::model::CodeLinkRecord;

pub fn load(
    conn: &mut Connection,
    rows: &[CodeLinkRecord],
    batch_size: usize,
    checkpoint: &mut Checkpoint,
    store: &CheckpointStore,
) -> Result<StageCounts> {
    stage::run_batches(
        conn,
        Stream::Links,
        rows,
        batch_size,
        checkpoint,
        store,
        insert_link,
    )
}

/// A link whose paper never made it into the destination is a referential
/// miss, skipped rather than stored with an invalid reference.
pub(super) fn insert_link(tx: &Transaction, row: &CodeLinkRecord) -> Result<RowOutcome> {
    let Some(arxiv_id) = key_field(&row.paper_arxiv_id) else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingKey));
    };
    let Some(repo_url) = key_field(&row.repo_url) else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingKey));
    };

    let Some(paper_id) = lookup_paper(tx, arxiv_id)? else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingReferent));
    };

    let changed = tx.execute(
        "INSERT INTO implementations (paper_id, github_url, framework, is_official)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(paper_id, github_url) DO NOTHING",
        params![
            paper_id,
            repo_url,
            row.framework,
            row.is_official.unwrap_or(false)
        ],
    )?;

    Ok(if changed == 0 {
        RowOutcome::Skipped(SkipReason::Duplicate)
    } else {
        RowOutcome::Inserted
    })
}
