use anyhow::Result;
use rusqlite::{Connection, Transaction, params};

use super::checkpoint::{Checkpoint, CheckpointStore, Stream};
use super::stage::{self, RowOutcome, SkipReason, StageCounts};
use super::key_field;
use crate::model::DatasetRecord;

pub fn load(
    conn: &mut Connection,
    rows: &[DatasetRecord],
    batch_size: usize,
    checkpoint: &mut Checkpoint,
    store: &CheckpointStore,
) -> Result<StageCounts> {
    stage::run_batches(
        conn,
        Stream::Datasets,
        rows,
        batch_size,
        checkpoint,
        store,
        insert_dataset,
    )
}

pub(super) fn insert_dataset(tx: &Transaction, row: &DatasetRecord) -> Result<RowOutcome> {
    let Some(name) = key_field(&row.name) else {
        return Ok(RowOutcome::Skipped(SkipReason::MissingKey));
    };

    let modalities = row
        .modalities
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let changed = tx.execute(
        "INSERT INTO datasets (name, description, modalities, homepage_url, paper_url)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(name) DO NOTHING",
        params![
            name,
            row.description,
            modalities,
            row.homepage,
            row.paper_url
        ],
    )?;

    Ok(if changed == 0 {
        RowOutcome::Skipped(SkipReason::Duplicate)
    } else {
        RowOutcome::Inserted
    })
}
