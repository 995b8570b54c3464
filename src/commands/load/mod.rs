use anyhow::Result;
use rusqlite::{OptionalExtension, Transaction};

mod checkpoint;
mod datasets;
mod db_setup;
mod evaluation;
mod links;
mod papers;
mod run;
mod source;
mod stage;
#[cfg(test)]
mod tests;

pub use run::run;

pub(crate) use checkpoint::{CheckpointStore, Stream};
pub(crate) use db_setup::{configure_connection, ensure_schema};

/// Natural keys must be present and non-empty to be usable for dedup.
fn key_field(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn lookup_paper(tx: &Transaction, arxiv_id: &str) -> Result<Option<i64>> {
    let id = tx
        .query_row(
            "SELECT id FROM papers WHERE arxiv_id = ?1 LIMIT 1",
            [arxiv_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn lookup_dataset(tx: &Transaction, name: &str) -> Result<Option<i64>> {
    let id = tx
        .query_row(
            "SELECT id FROM datasets WHERE name = ?1 LIMIT 1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}
