/// Durable reading log and in-memory accumulation for the run
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::models::{AccumulationRecord, Reading};

pub const CSV_HEADER: [&str; 7] = [
    "timestamp",
    "lote",
    "temperatura",
    "humedad",
    "voltaje_real",
    "corriente_sim",
    "piezas_contadas",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not create reading log {}: {source}", path.display())]
    Init {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not append to reading log {}: {source}", path.display())]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not encode row: {0}")]
    Encode(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    timestamp: &'a str,
    lote: &'a str,
    temperatura: f64,
    humedad: f64,
    voltaje_real: f64,
    corriente_sim: f64,
    piezas_contadas: u8,
}

fn encode_header() -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

fn encode_row(row: &CsvRow<'_>) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.serialize(row)?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Accepted readings of the run, kept in memory and appended to a CSV log.
#[derive(Debug)]
pub struct ReadingStore {
    path: PathBuf,
    records: Vec<AccumulationRecord>,
}

impl ReadingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ReadingStore {
            path: path.into(),
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[AccumulationRecord] {
        &self.records
    }

    /// Recreate the log file with only the header row
    ///
    /// The run must not start acquiring if this fails.
    pub async fn init(&self) -> Result<(), StoreError> {
        let header = encode_header()?;
        fs::write(&self.path, header)
            .await
            .map_err(|source| StoreError::Init {
                path: self.path.clone(),
                source,
            })?;
        info!("Reading log '{}' ready", self.path.display());
        Ok(())
    }

    /// Record an accepted reading
    ///
    /// The in-memory copy is always kept, so aggregation stays complete even
    /// when the file append fails. A failed append is returned to the caller.
    ///
    /// # Arguments
    /// * `label` - Batch label the reading belongs to
    /// * `reading` - The accepted reading
    /// * `timestamp` - Formatted time of the reading
    pub async fn append(
        &mut self,
        label: &str,
        reading: &Reading,
        timestamp: &str,
    ) -> Result<(), StoreError> {
        self.records.push(AccumulationRecord {
            label: label.to_string(),
            reading: *reading,
        });

        let row = encode_row(&CsvRow {
            timestamp,
            lote: label,
            temperatura: reading.temperature,
            humedad: reading.humidity,
            voltaje_real: reading.voltage,
            corriente_sim: reading.current,
            piezas_contadas: reading.unit_count,
        })?;

        let append_err = |source| StoreError::Append {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(append_err)?;
        file.write_all(&row).await.map_err(append_err)?;
        file.flush().await.map_err(append_err)?;
        Ok(())
    }
}
