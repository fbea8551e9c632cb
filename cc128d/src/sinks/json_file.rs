use std::path::Path;

use cc128_client::domain::StampedReading;
use serde::Serialize;

use super::{format_timestamp, streaming_document::StreamingDocument};
use crate::pipeline::{PipelineError, Sink};

#[derive(Serialize)]
struct JsonRecord {
    timestamp: String,
    temperature: f64,
    channels: Vec<Option<u32>>,
}

impl JsonRecord {
    fn from_reading(reading: &StampedReading) -> Result<Self, PipelineError> {
        Ok(Self {
            timestamp: format_timestamp(reading.timestamp)?,
            temperature: reading.reading.temperature_celsius,
            channels: reading.reading.channels.iter().map(|ch| ch.map(|r| r.watts)).collect(),
        })
    }
}

/// Writes a JSON array of reading objects that stays valid after each append.
pub struct JsonFileSink {
    doc: StreamingDocument,
}

impl JsonFileSink {
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        tracing::warn!(path = %path.display(), "creating JSON file");
        let doc = StreamingDocument::create(path, "[\n", ",\n", "\n]")
            .map_err(|e| PipelineError::Sink(format!("failed to create JSON file {}: {e}", path.display())))?;
        Ok(Self { doc })
    }
}

#[async_trait::async_trait]
impl Sink for JsonFileSink {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn append(&mut self, reading: &StampedReading) -> Result<(), PipelineError> {
        tracing::info!("writing values to JSON file");
        let record = JsonRecord::from_reading(reading)?;
        let encoded = serde_json::to_string(&record)
            .map_err(|e| PipelineError::Sink(format!("failed to encode JSON record: {e}")))?;
        self.doc.append_record(&encoded).map_err(|e| {
            PipelineError::Sink(format!("JSON write to {} failed: {e}", self.doc.path().display()))
        })
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        self.doc
            .sync()
            .map_err(|e| PipelineError::Sink(format!("JSON sync of {} failed: {e}", self.doc.path().display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::test_support::stamped;
    use serde_json::Value;

    fn parse(path: &Path) -> Vec<Value> {
        let text = std::fs::read_to_string(path).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn file_is_a_valid_array_after_every_append() {
        for n in [1u32, 2, 5] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("readings.json");
            let mut sink = JsonFileSink::create(&path).unwrap();

            for i in 0..n {
                sink.append(&stamped(&[(1, 100 + i)])).await.unwrap();
                assert_eq!(parse(&path).len(), i as usize + 1);
            }

            let records = parse(&path);
            assert_eq!(records.len(), n as usize);
            for (i, record) in records.iter().enumerate() {
                assert_eq!(record["channels"][0], 100 + i as u64);
            }
        }
    }

    #[tokio::test]
    async fn record_has_timestamp_temperature_and_nine_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.json");
        let mut sink = JsonFileSink::create(&path).unwrap();

        sink.append(&stamped(&[(2, 2151), (9, 7)])).await.unwrap();

        let records = parse(&path);
        let record = &records[0];
        assert_eq!(record["timestamp"], "2024-01-01T23:58:00Z");
        assert_eq!(record["temperature"], 21.5);
        let channels = record["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 9);
        assert!(channels[0].is_null());
        assert_eq!(channels[1], 2151);
        assert_eq!(channels[8], 7);
    }

    #[tokio::test]
    async fn empty_document_is_only_the_opening_bracket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.json");
        let _sink = JsonFileSink::create(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[\n");
    }
}
