pub mod csv_file;
pub mod http_get;
pub mod json_file;
pub mod sqlite_table;
pub mod streaming_document;
pub mod xml_file;

pub use csv_file::CsvFileSink;
pub use http_get::HttpGetSink;
pub use json_file::JsonFileSink;
pub use sqlite_table::SqliteTableSink;
pub use xml_file::XmlFileSink;

use cc128_client::domain::StampedReading;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    config::OutputConfig,
    pipeline::{PipelineError, Sink},
};

pub(crate) fn format_timestamp(ts: OffsetDateTime) -> Result<String, PipelineError> {
    ts.format(&Rfc3339)
        .map_err(|e| PipelineError::Sink(format!("failed to format timestamp {ts}: {e}")))
}

/// The configured output kinds.
pub enum OutputSink {
    Csv(CsvFileSink),
    Json(JsonFileSink),
    Xml(XmlFileSink),
    Sqlite(SqliteTableSink),
    HttpGet(HttpGetSink),
}

impl OutputSink {
    /// Open the destination. JSON and XML files are truncated and get their
    /// opening token here.
    ///
    /// RRD and HTTP POST outputs are not implemented and fail rather than
    /// silently dropping readings.
    pub async fn open(config: &OutputConfig) -> Result<Self, PipelineError> {
        let sink = match config {
            OutputConfig::Csv { path } => Self::Csv(CsvFileSink::open(path)?),
            OutputConfig::Json { path } => Self::Json(JsonFileSink::create(path)?),
            OutputConfig::Xml { path } => Self::Xml(XmlFileSink::create(path)?),
            OutputConfig::Sqlite { target } => Self::Sqlite(SqliteTableSink::open(target).await?),
            OutputConfig::HttpGet { url } => Self::HttpGet(HttpGetSink::new(url)?),
            OutputConfig::Rrd { .. } => return Err(PipelineError::NotImplemented("RRD")),
            OutputConfig::HttpPost { .. } => return Err(PipelineError::NotImplemented("HTTP POST")),
        };
        Ok(sink)
    }
}

#[async_trait::async_trait]
impl Sink for OutputSink {
    fn name(&self) -> &'static str {
        match self {
            Self::Csv(s) => s.name(),
            Self::Json(s) => s.name(),
            Self::Xml(s) => s.name(),
            Self::Sqlite(s) => s.name(),
            Self::HttpGet(s) => s.name(),
        }
    }

    async fn append(&mut self, reading: &StampedReading) -> Result<(), PipelineError> {
        match self {
            Self::Csv(s) => s.append(reading).await,
            Self::Json(s) => s.append(reading).await,
            Self::Xml(s) => s.append(reading).await,
            Self::Sqlite(s) => s.append(reading).await,
            Self::HttpGet(s) => s.append(reading).await,
        }
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        match self {
            Self::Csv(s) => s.close().await,
            Self::Json(s) => s.close().await,
            Self::Xml(s) => s.close().await,
            Self::Sqlite(s) => s.close().await,
            Self::HttpGet(s) => s.close().await,
        }
    }
}

/// Fans each reading out to every sink, in configuration order.
///
/// A failing sink stops the fan-out and the error is returned to the caller;
/// later sinks do not see that reading.
pub struct Dispatcher {
    sinks: Vec<OutputSink>,
}

impl Dispatcher {
    pub fn new(sinks: Vec<OutputSink>) -> Self {
        Self { sinks }
    }

    pub async fn open_all(configs: &[OutputConfig]) -> Result<Self, PipelineError> {
        let mut sinks = Vec::with_capacity(configs.len());
        for config in configs {
            sinks.push(OutputSink::open(config).await?);
        }
        if sinks.is_empty() {
            tracing::warn!("no outputs configured, readings will only be logged");
        }
        Ok(Self::new(sinks))
    }

    pub async fn append(&mut self, reading: &StampedReading) -> Result<(), PipelineError> {
        for sink in &mut self.sinks {
            let name = sink.name();
            if let Err(e) = sink.append(reading).await {
                metrics::counter!("cc128_sink_errors_total", "sink" => name).increment(1);
                return Err(e);
            }
            metrics::counter!("cc128_sink_writes_total", "sink" => name).increment(1);
        }
        Ok(())
    }

    /// Close every sink, logging failures rather than returning them.
    pub async fn close_all(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.close().await {
                tracing::warn!(sink = sink.name(), error = %e, "failed to close sink");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use cc128_client::domain::{ElectricReading, RealTimeReading, SensorType, StampedReading, CHANNEL_COUNT};
    use time::macros::{datetime, time};

    /// A reading at 2024-01-01T23:58:00Z, 21.5°C, with the given
    /// `(channel number, watts)` pairs populated.
    pub fn stamped(channels: &[(usize, u32)]) -> StampedReading {
        let mut slots = [None; CHANNEL_COUNT];
        for &(number, watts) in channels {
            slots[number - 1] = Some(ElectricReading::new(watts));
        }
        RealTimeReading {
            source: "CC128-v0.11".to_string(),
            age_secs: 89,
            meter_time: time!(23:58:00),
            temperature_celsius: 21.5,
            sensor_id: 0,
            radio_id: 1234,
            sensor_type: SensorType::Electricity,
            channels: slots,
        }
        .stamp(datetime!(2024-01-01 23:58:00 UTC))
    }
}
