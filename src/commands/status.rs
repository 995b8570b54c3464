use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::load::{CheckpointStore, Stream};
use crate::config::{CHECKPOINT_FILENAME, resolve_db_path};

pub fn run(args: StatusArgs) -> Result<()> {
    let checkpoint_path = args.data_root.join(CHECKPOINT_FILENAME);
    let db_path = resolve_db_path(&args.data_root, args.db_path.as_deref());

    info!(data_root = %args.data_root.display(), "status requested");

    let store = CheckpointStore::new(checkpoint_path);
    if store.exists() {
        match store.load() {
            Ok(checkpoint) => {
                for stream in Stream::ALL {
                    info!(
                        stream = stream.as_str(),
                        offset = checkpoint.offset(stream),
                        complete = checkpoint.is_complete(stream),
                        "checkpoint position"
                    );
                }
            }
            Err(err) => warn!(error = %err, "checkpoint unreadable"),
        }
    } else {
        info!(
            path = %store.path().display(),
            "no checkpoint; loading has not started or finished cleanly"
        );
    }

    if db_path.exists() {
        let conn = Connection::open(&db_path)?;
        let papers = query_count(&conn, "SELECT COUNT(*) FROM papers").unwrap_or(0);
        let datasets = query_count(&conn, "SELECT COUNT(*) FROM datasets").unwrap_or(0);
        let implementations =
            query_count(&conn, "SELECT COUNT(*) FROM implementations").unwrap_or(0);
        let benchmarks = query_count(&conn, "SELECT COUNT(*) FROM benchmarks").unwrap_or(0);
        let benchmark_results =
            query_count(&conn, "SELECT COUNT(*) FROM benchmark_results").unwrap_or(0);

        info!(
            path = %db_path.display(),
            papers,
            datasets,
            implementations,
            benchmarks,
            benchmark_results,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
