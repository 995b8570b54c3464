use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CHECKPOINT_VERSION: u32 = 1;

/// The four entity streams, in the order the orchestrator runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Papers,
    Datasets,
    Links,
    Evaluation,
}

impl Stream {
    pub const ALL: [Stream; 4] = [
        Stream::Papers,
        Stream::Datasets,
        Stream::Links,
        Stream::Evaluation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Papers => "papers",
            Self::Datasets => "datasets",
            Self::Links => "links",
            Self::Evaluation => "evaluation",
        }
    }
}

/// Versioned snapshot of per-stream load progress. Offsets count source rows
/// already committed; they only ever grow within one checkpoint lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_version: u32,
    pub papers_offset: usize,
    pub datasets_offset: usize,
    pub links_offset: usize,
    pub eval_offset: usize,
    pub papers_complete: bool,
    pub datasets_complete: bool,
    pub links_complete: bool,
    pub eval_complete: bool,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            checkpoint_version: CHECKPOINT_VERSION,
            papers_offset: 0,
            datasets_offset: 0,
            links_offset: 0,
            eval_offset: 0,
            papers_complete: false,
            datasets_complete: false,
            links_complete: false,
            eval_complete: false,
        }
    }
}

impl Checkpoint {
    pub fn offset(&self, stream: Stream) -> usize {
        match stream {
            Stream::Papers => self.papers_offset,
            Stream::Datasets => self.datasets_offset,
            Stream::Links => self.links_offset,
            Stream::Evaluation => self.eval_offset,
        }
    }

    pub fn set_offset(&mut self, stream: Stream, offset: usize) {
        match stream {
            Stream::Papers => self.papers_offset = offset,
            Stream::Datasets => self.datasets_offset = offset,
            Stream::Links => self.links_offset = offset,
            Stream::Evaluation => self.eval_offset = offset,
        }
    }

    pub fn is_complete(&self, stream: Stream) -> bool {
        match stream {
            Stream::Papers => self.papers_complete,
            Stream::Datasets => self.datasets_complete,
            Stream::Links => self.links_complete,
            Stream::Evaluation => self.eval_complete,
        }
    }

    pub fn set_complete(&mut self, stream: Stream) {
        match stream {
            Stream::Papers => self.papers_complete = true,
            Stream::Datasets => self.datasets_complete = true,
            Stream::Links => self.links_complete = true,
            Stream::Evaluation => self.eval_complete = true,
        }
    }

    pub fn all_complete(&self) -> bool {
        Stream::ALL.iter().all(|&s| self.is_complete(s))
    }

    pub fn any_progress(&self) -> bool {
        Stream::ALL
            .iter()
            .any(|&s| self.offset(s) > 0 || self.is_complete(s))
    }
}

/// File-backed checkpoint persistence. The file is exclusively owned by the
/// single running loader process; there is no cross-process locking.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Missing file yields a fresh checkpoint. A file that exists but cannot
    /// be parsed is fatal for resume; the remedy is `--fresh`.
    pub fn load(&self) -> Result<Checkpoint> {
        if !self.path.exists() {
            return Ok(Checkpoint::default());
        }

        let raw = fs::read(&self.path)
            .with_context(|| format!("failed to read checkpoint {}", self.path.display()))?;
        let checkpoint: Checkpoint = serde_json::from_slice(&raw).with_context(|| {
            format!(
                "corrupt checkpoint {} (rerun with --fresh to discard it)",
                self.path.display()
            )
        })?;

        if checkpoint.checkpoint_version != CHECKPOINT_VERSION {
            bail!(
                "checkpoint {} has version {}, expected {} (rerun with --fresh to discard it)",
                self.path.display(),
                checkpoint.checkpoint_version,
                CHECKPOINT_VERSION
            );
        }

        Ok(checkpoint)
    }

    /// Write-then-rename so an interrupted save never leaves a torn file.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let data = serde_json::to_vec_pretty(checkpoint).context("failed to serialize checkpoint")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &data)
            .with_context(|| format!("failed to write checkpoint {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("failed to replace checkpoint {}", self.path.display()))?;

        debug!(path = %self.path.display(), "checkpoint saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to delete checkpoint {}", self.path.display())),
        }
    }
}
