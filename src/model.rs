use serde::{Deserialize, Serialize};

/// One row of the papers-with-abstracts export. All fields are optional at
/// decode time; the loader enforces key presence at insert time.
#[derive(Debug, Clone, Default)]
pub struct PaperRecord {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub arxiv_id: Option<String>,
    pub url_abs: Option<String>,
    pub url_pdf: Option<String>,
    pub date: Option<String>,
    pub authors: Option<Vec<String>>,
}

/// One row of the datasets export. `paper_url` is the `url` sub-field of the
/// nested `paper` column.
#[derive(Debug, Clone, Default)]
pub struct DatasetRecord {
    pub name: Option<String>,
    pub description: Option<String>,
    pub modalities: Option<Vec<String>>,
    pub homepage: Option<String>,
    pub paper_url: Option<String>,
}

/// One row of the links-between-paper-and-code export.
#[derive(Debug, Clone, Default)]
pub struct CodeLinkRecord {
    pub paper_arxiv_id: Option<String>,
    pub repo_url: Option<String>,
    pub framework: Option<String>,
    pub is_official: Option<bool>,
}

/// One flattened evaluation record. `value` stays textual until insert time so
/// non-numeric metrics can be counted rather than dropped silently.
#[derive(Debug, Clone, Default)]
pub struct EvalRecord {
    pub dataset: Option<String>,
    pub task: Option<String>,
    pub metric: Option<String>,
    pub value: Option<String>,
    pub paper_arxiv_id: Option<String>,
}

/// One document of the raw evaluation-tables archive as emitted by the
/// JSON-Lines export, consumed by the streaming variant.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalTableDoc {
    pub task: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub datasets: Vec<EvalTableDataset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvalTableDataset {
    pub dataset: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFileEntry {
    pub stream: String,
    pub filename: String,
    pub sha256: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadPaths {
    pub data_root: String,
    pub db_path: String,
    pub checkpoint_path: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadCounts {
    pub papers_inserted: usize,
    pub papers_skipped: usize,
    pub datasets_inserted: usize,
    pub datasets_skipped: usize,
    pub links_inserted: usize,
    pub links_skipped: usize,
    pub eval_inserted: usize,
    pub eval_skipped: usize,
    pub benchmarks_upserted: usize,
    pub papers_total: i64,
    pub datasets_total: i64,
    pub implementations_total: i64,
    pub benchmarks_total: i64,
    pub benchmark_results_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub batch_size: usize,
    pub paths: LoadPaths,
    pub sources: Vec<SourceFileEntry>,
    pub counts: LoadCounts,
    pub notes: Vec<String>,
}
