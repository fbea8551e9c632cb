use std::{fmt::Write as _, path::Path};

use cc128_client::domain::StampedReading;

use super::{format_timestamp, streaming_document::StreamingDocument};
use crate::pipeline::{PipelineError, Sink};

const OPENING: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<readings>\n";

fn reading_element(reading: &StampedReading) -> Result<String, PipelineError> {
    let mut out = String::with_capacity(256);
    let _ = write!(
        out,
        "<reading timestamp=\"{}\" temperature=\"{:.6}\"",
        format_timestamp(reading.timestamp)?,
        reading.reading.temperature_celsius
    );

    let mut populated = reading.reading.populated_channels().peekable();
    if populated.peek().is_none() {
        out.push_str(" />");
        return Ok(out);
    }

    out.push('>');
    for (idx, ch) in populated {
        let _ = write!(out, "<channel id=\"{}\" watts=\"{}\" />", idx + 1, ch.watts);
    }
    out.push_str("</reading>");
    Ok(out)
}

/// Writes a `<readings>` document with one `<reading>` element per append.
pub struct XmlFileSink {
    doc: StreamingDocument,
}

impl XmlFileSink {
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        tracing::warn!(path = %path.display(), "creating XML file");
        let doc = StreamingDocument::create(path, OPENING, "\n", "\n</readings>")
            .map_err(|e| PipelineError::Sink(format!("failed to create XML file {}: {e}", path.display())))?;
        Ok(Self { doc })
    }
}

#[async_trait::async_trait]
impl Sink for XmlFileSink {
    fn name(&self) -> &'static str {
        "xml"
    }

    async fn append(&mut self, reading: &StampedReading) -> Result<(), PipelineError> {
        tracing::info!("writing values to XML file");
        let element = reading_element(reading)?;
        self.doc.append_record(&element).map_err(|e| {
            PipelineError::Sink(format!("XML write to {} failed: {e}", self.doc.path().display()))
        })
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        self.doc
            .sync()
            .map_err(|e| PipelineError::Sink(format!("XML sync of {} failed: {e}", self.doc.path().display())))
    }
}
