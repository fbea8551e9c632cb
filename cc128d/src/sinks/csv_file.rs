use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use cc128_client::domain::StampedReading;

use super::format_timestamp;
use crate::pipeline::{PipelineError, Sink};

/// Appends one row per reading: timestamp, temperature and one watts cell per
/// channel (empty when the channel is absent). No header is written.
pub struct CsvFileSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvFileSink {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        tracing::info!(path = %path.display(), "appending to CSV file");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PipelineError::Sink(format!("failed to open CSV file {}: {e}", path.display())))?;
        let writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }
}

fn csv_row(reading: &StampedReading) -> Result<Vec<String>, PipelineError> {
    let mut row = Vec::with_capacity(2 + reading.reading.channels.len());
    row.push(format_timestamp(reading.timestamp)?);
    row.push(reading.reading.temperature_celsius.to_string());
    row.extend(
        reading
            .reading
            .channels
            .iter()
            .map(|ch| ch.map(|r| r.watts.to_string()).unwrap_or_default()),
    );
    Ok(row)
}

#[async_trait::async_trait]
impl Sink for CsvFileSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn append(&mut self, reading: &StampedReading) -> Result<(), PipelineError> {
        tracing::info!("writing values to CSV file");
        let row = csv_row(reading)?;
        self.writer
            .write_record(&row)
            .map_err(|e| PipelineError::Sink(format!("CSV write to {} failed: {e}", self.path.display())))?;
        self.writer
            .flush()
            .map_err(|e| PipelineError::Sink(format!("CSV flush of {} failed: {e}", self.path.display())))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        self.writer
            .flush()
            .map_err(|e| PipelineError::Sink(format!("CSV flush of {} failed: {e}", self.path.display())))
    }
}
