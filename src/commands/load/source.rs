use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use arrow::array::{
    Array, BooleanArray, Date32Array, Float32Array, Float64Array, ListArray, StringArray,
    StructArray, TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::model::{CodeLinkRecord, DatasetRecord, EvalRecord, PaperRecord};

/// Materializes the papers-with-abstracts export. Decode is tolerant: a
/// missing column or a null cell becomes an absent field, and key checks
/// happen at insert time.
pub fn read_papers(path: &Path) -> Result<Vec<PaperRecord>> {
    let mut out = Vec::new();

    for_each_batch(path, |batch| {
        let title = col_string(batch, "title");
        let abstract_text = col_string(batch, "abstract");
        let arxiv_id = col_string(batch, "arxiv_id");
        let url_abs = col_string(batch, "url_abs");
        let url_pdf = col_string(batch, "url_pdf");
        let date = batch.column_by_name("date");
        let authors = col_list(batch, "authors");

        for i in 0..batch.num_rows() {
            out.push(PaperRecord {
                title: string_at(title, i),
                abstract_text: string_at(abstract_text, i),
                arxiv_id: string_at(arxiv_id, i),
                url_abs: string_at(url_abs, i),
                url_pdf: string_at(url_pdf, i),
                date: date.and_then(|col| date_at(col.as_ref(), i)),
                authors: string_list_at(authors, i),
            });
        }
        Ok(())
    })?;

    Ok(out)
}

pub fn read_datasets(path: &Path) -> Result<Vec<DatasetRecord>> {
    let mut out = Vec::new();

    for_each_batch(path, |batch| {
        let name = col_string(batch, "name");
        let description = col_string(batch, "description");
        let modalities = col_list(batch, "modalities");
        let homepage = col_string(batch, "homepage");
        let paper = col_struct(batch, "paper");

        for i in 0..batch.num_rows() {
            out.push(DatasetRecord {
                name: string_at(name, i),
                description: string_at(description, i),
                modalities: string_list_at(modalities, i),
                homepage: string_at(homepage, i),
                paper_url: struct_string_at(paper, "url", i),
            });
        }
        Ok(())
    })?;

    Ok(out)
}

pub fn read_links(path: &Path) -> Result<Vec<CodeLinkRecord>> {
    let mut out = Vec::new();

    for_each_batch(path, |batch| {
        let paper_arxiv_id = col_string(batch, "paper_arxiv_id");
        let repo_url = col_string(batch, "repo_url");
        let framework = col_string(batch, "framework");
        let is_official = col_bool(batch, "is_official");

        for i in 0..batch.num_rows() {
            out.push(CodeLinkRecord {
                paper_arxiv_id: string_at(paper_arxiv_id, i),
                repo_url: string_at(repo_url, i),
                framework: string_at(framework, i),
                is_official: bool_at(is_official, i),
            });
        }
        Ok(())
    })?;

    Ok(out)
}

pub fn read_eval(path: &Path) -> Result<Vec<EvalRecord>> {
    let mut out = Vec::new();

    for_each_batch(path, |batch| {
        let dataset = col_string(batch, "dataset");
        let task = col_string(batch, "task");
        let metric = col_string(batch, "metric");
        let value = batch.column_by_name("value");
        let paper_arxiv_id = col_string(batch, "paper_arxiv_id");

        for i in 0..batch.num_rows() {
            out.push(EvalRecord {
                dataset: string_at(dataset, i),
                task: string_at(task, i),
                metric: string_at(metric, i),
                value: value.and_then(|col| value_text_at(col.as_ref(), i)),
                paper_arxiv_id: string_at(paper_arxiv_id, i),
            });
        }
        Ok(())
    })?;

    Ok(out)
}

fn for_each_batch(path: &Path, mut visit: impl FnMut(&RecordBatch) -> Result<()>) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("failed to read parquet metadata: {}", path.display()))?
        .build()
        .with_context(|| format!("failed to build parquet reader: {}", path.display()))?;

    for batch in reader {
        let batch =
            batch.with_context(|| format!("failed to decode batch from {}", path.display()))?;
        visit(&batch)?;
    }

    Ok(())
}

fn col_string<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<StringArray>()
}

fn col_list<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a ListArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<ListArray>()
}

fn col_struct<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StructArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<StructArray>()
}

fn col_bool<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a BooleanArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<BooleanArray>()
}

fn string_at(col: Option<&StringArray>, i: usize) -> Option<String> {
    let col = col?;
    if col.is_null(i) {
        return None;
    }
    Some(col.value(i).to_string())
}

fn bool_at(col: Option<&BooleanArray>, i: usize) -> Option<bool> {
    let col = col?;
    if col.is_null(i) {
        return None;
    }
    Some(col.value(i))
}

fn string_list_at(col: Option<&ListArray>, i: usize) -> Option<Vec<String>> {
    let col = col?;
    if col.is_null(i) {
        return None;
    }
    let values = col.value(i);
    let strings = values.as_any().downcast_ref::<StringArray>()?;

    Some(
        (0..strings.len())
            .filter(|&j| !strings.is_null(j))
            .map(|j| strings.value(j).to_string())
            .collect(),
    )
}

fn struct_string_at(col: Option<&StructArray>, field: &str, i: usize) -> Option<String> {
    let col = col?;
    if col.is_null(i) {
        return None;
    }
    let strings = col
        .column_by_name(field)?
        .as_any()
        .downcast_ref::<StringArray>()?;
    if strings.is_null(i) {
        return None;
    }
    Some(strings.value(i).to_string())
}

/// Renders a date-like cell to ISO text. The archive exports dates as plain
/// strings, calendar days, or pandas timestamps depending on the snapshot.
fn date_at(col: &dyn Array, i: usize) -> Option<String> {
    if col.is_null(i) {
        return None;
    }

    let any = col.as_any();
    if let Some(strings) = any.downcast_ref::<StringArray>() {
        return Some(strings.value(i).to_string());
    }
    if let Some(days) = any.downcast_ref::<Date32Array>() {
        return days.value_as_date(i).map(|d| d.format("%Y-%m-%d").to_string());
    }
    if let Some(ts) = any.downcast_ref::<TimestampNanosecondArray>() {
        return ts
            .value_as_datetime(i)
            .map(|dt| dt.date().format("%Y-%m-%d").to_string());
    }
    if let Some(ts) = any.downcast_ref::<TimestampMicrosecondArray>() {
        return ts
            .value_as_datetime(i)
            .map(|dt| dt.date().format("%Y-%m-%d").to_string());
    }
    if let Some(ts) = any.downcast_ref::<TimestampMillisecondArray>() {
        return ts
            .value_as_datetime(i)
            .map(|dt| dt.date().format("%Y-%m-%d").to_string());
    }

    None
}

/// Metric values arrive as text or floats; keep them textual so the loader
/// can count non-numeric values instead of dropping them at decode time.
fn value_text_at(col: &dyn Array, i: usize) -> Option<String> {
    if col.is_null(i) {
        return None;
    }

    let any = col.as_any();
    if let Some(strings) = any.downcast_ref::<StringArray>() {
        return Some(strings.value(i).to_string());
    }
    if let Some(floats) = any.downcast_ref::<Float64Array>() {
        return Some(floats.value(i).to_string());
    }
    if let Some(floats) = any.downcast_ref::<Float32Array>() {
        return Some(floats.value(i).to_string());
    }

    None
}
