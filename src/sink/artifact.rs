// src/sink/artifact.rs
use anyhow::{anyhow, bail, Context, Result};
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Deserialize;
use std::sync::Arc;

use crate::harvest::types::{Batch, Payload};

/// Encoding used for tabular payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    #[default]
    Csv,
    /// Snappy-compressed Parquet, one UTF-8 column per header field.
    Parquet,
}

/// A batch encoded into its storable form.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Batch name plus file extension, e.g. `20240101--20240102.csv`.
    pub name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Encode with tables written as CSV.
    pub fn from_batch(batch: &Batch) -> Result<Self> {
        Self::encode(batch, TableFormat::Csv)
    }

    pub fn encode(batch: &Batch, table_format: TableFormat) -> Result<Self> {
        let (ext, content_type, bytes) = match &batch.payload {
            Payload::Table { columns, rows } => match table_format {
                TableFormat::Csv => ("csv", "text/csv", encode_csv(columns, rows)?),
                TableFormat::Parquet => (
                    "parquet",
                    "application/vnd.apache.parquet",
                    encode_parquet(columns, rows)?,
                ),
            },
            Payload::Records(records) => (
                "json",
                "application/json",
                serde_json::to_vec(records).context("encoding records as json")?,
            ),
            Payload::Raw { bytes, extension } => (
                extension.trim_start_matches('.'),
                "application/octet-stream",
                bytes.clone(),
            ),
        };
        let name = if ext.is_empty() {
            batch.name.clone()
        } else {
            format!("{}.{}", batch.name, ext)
        };
        Ok(Self {
            name,
            content_type,
            bytes,
        })
    }
}

fn ensure_rectangular(columns: &[String], rows: &[Vec<String>]) -> Result<()> {
    match rows.iter().position(|row| row.len() != columns.len()) {
        Some(i) => Err(anyhow!(
            "row {i} has {} cells, header has {}",
            rows[i].len(),
            columns.len()
        )),
        None => Ok(()),
    }
}

fn encode_csv(columns: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>> {
    ensure_rectangular(columns, rows)?;
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(columns).context("writing csv header")?;
    for row in rows {
        w.write_record(row).context("writing csv row")?;
    }
    w.into_inner()
        .map_err(|e| anyhow!("flushing csv buffer: {}", e.error()))
}

fn encode_parquet(columns: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>> {
    ensure_rectangular(columns, rows)?;
    if columns.is_empty() {
        bail!("cannot write a parquet table without columns");
    }

    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|c| Field::new(c.as_str(), DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = (0..columns.len())
        .map(|i| {
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r[i].as_str()),
            )) as ArrayRef
        })
        .collect();
    let batch =
        RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer =
        ArrowWriter::try_new(Vec::new(), schema, Some(props)).context("opening parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.into_inner().context("closing parquet writer")
}
