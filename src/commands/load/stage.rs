use anyhow::Result;
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::{info, warn};

use super::checkpoint::{Checkpoint, CheckpointStore, Stream};

/// Outcome of one source row after transform and upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The natural key already exists in the destination.
    Duplicate,
    /// The row lacks its required natural key and cannot be represented.
    MissingKey,
    /// The row references an entity the destination does not hold.
    MissingReferent,
    /// A required value is absent or non-numeric.
    BadValue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub inserted: usize,
    pub skipped: usize,
    pub skipped_duplicate: usize,
    pub skipped_missing_key: usize,
    pub skipped_missing_referent: usize,
    pub skipped_bad_value: usize,
    pub skipped_error: usize,
}

impl StageCounts {
    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Inserted => self.inserted += 1,
            RowOutcome::Skipped(reason) => {
                self.skipped += 1;
                match reason {
                    SkipReason::Duplicate => self.skipped_duplicate += 1,
                    SkipReason::MissingKey => self.skipped_missing_key += 1,
                    SkipReason::MissingReferent => self.skipped_missing_referent += 1,
                    SkipReason::BadValue => self.skipped_bad_value += 1,
                }
            }
        }
    }

    fn record_error(&mut self) {
        self.skipped += 1;
        self.skipped_error += 1;
    }

    pub fn processed(&self) -> usize {
        self.inserted + self.skipped
    }
}

/// Runs one entity stream in committed batches, resuming from the checkpoint
/// offset. The insert closure sees one row inside the batch transaction and
/// reports whether it landed or why it was skipped; a closure error skips the
/// row, never the batch. The checkpoint is persisted after every commit, so a
/// crash re-attempts at most one batch and insert-if-absent absorbs the
/// re-attempted rows.
pub fn run_batches<T>(
    conn: &mut Connection,
    stream: Stream,
    rows: &[T],
    batch_size: usize,
    checkpoint: &mut Checkpoint,
    store: &CheckpointStore,
    mut insert_row: impl FnMut(&Transaction, &T) -> Result<RowOutcome>,
) -> Result<StageCounts> {
    let mut counts = StageCounts::default();

    if checkpoint.is_complete(stream) {
        info!(stream = stream.as_str(), "already loaded, skipping");
        return Ok(counts);
    }

    let total = rows.len();
    let mut offset = checkpoint.offset(stream).min(total);
    info!(
        stream = stream.as_str(),
        total,
        offset,
        batch_size,
        "loading stream"
    );

    while offset < total {
        let upper = (offset + batch_size).min(total);
        let tx = conn.transaction()?;

        for row in &rows[offset..upper] {
            match insert_row(&tx, row) {
                Ok(outcome) => counts.record(outcome),
                Err(err) => {
                    warn!(stream = stream.as_str(), error = %err, "row failed, skipping");
                    counts.record_error();
                }
            }
        }

        tx.commit()?;
        offset = upper;
        checkpoint.set_offset(stream, offset);
        store.save(checkpoint)?;

        info!(
            stream = stream.as_str(),
            processed = offset,
            total,
            inserted = counts.inserted,
            skipped = counts.skipped,
            "batch committed"
        );
    }

    checkpoint.set_complete(stream);
    store.save(checkpoint)?;

    info!(
        stream = stream.as_str(),
        processed = counts.processed(),
        inserted = counts.inserted,
        skipped = counts.skipped,
        "stream complete"
    );

    Ok(counts)
}
