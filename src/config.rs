use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::cli::LoadArgs;

/// Resolved configuration for one loader run. Built once at startup so every
/// downstream component receives explicit paths instead of reading process
/// state.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub data_root: PathBuf,
    pub db_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub batch_size: usize,
}

pub const CHECKPOINT_FILENAME: &str = ".load_checkpoint.json";
pub const DEFAULT_DB_FILENAME: &str = "pwc_archive.sqlite";
pub const DB_PATH_ENV: &str = "PWCDB_DB_PATH";

impl LoadConfig {
    pub fn resolve(args: &LoadArgs) -> Result<Self> {
        if args.batch_size == 0 {
            bail!("--batch-size must be at least 1");
        }

        if !args.data_root.is_dir() {
            bail!(
                "data directory not found: {} (run the archive download first)",
                args.data_root.display()
            );
        }

        Ok(Self {
            data_root: args.data_root.clone(),
            db_path: resolve_db_path(&args.data_root, args.db_path.as_deref()),
            checkpoint_path: args.data_root.join(CHECKPOINT_FILENAME),
            batch_size: args.batch_size,
        })
    }
}

/// `--db-path` wins, then the environment override, then the default file
/// alongside the downloaded data.
pub fn resolve_db_path(data_root: &Path, db_path: Option<&Path>) -> PathBuf {
    if let Some(path) = db_path {
        return path.to_path_buf();
    }

    if let Ok(env_path) = std::env::var(DB_PATH_ENV) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    data_root.join(DEFAULT_DB_FILENAME)
}
