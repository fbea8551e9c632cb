use std::str::FromStr;

use cc128_client::domain::{ElectricReading, RealTimeReading, SensorType, CHANNEL_COUNT};
use roxmltree::{Document, Node};
use time::{macros::format_description, Time};

use crate::pipeline::{Envelope, PipelineError, Transform};

const ROOT_TAG: &str = "msg";
const HISTORY_TAG: &str = "hist";

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    RealTime(RealTimeReading),
    /// A history dump. Recognised so it can be skipped; its contents are not
    /// decoded.
    History,
}

/// Decode one CC-128 XML frame.
///
/// A real-time frame looks like:
///
/// ```text
/// <msg><src>CC128-v0.11</src><dsb>00089</dsb><time>13:02:39</time><tmpr>18.7</tmpr>
///   <sensor>1</sensor><id>01234</id><type>1</type><ch1><watts>00345</watts></ch1></msg>
/// ```
///
/// History frames carry a `<hist>` child instead of channel data.
pub fn decode_frame(frame: &[u8]) -> Result<DecodedFrame, PipelineError> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| PipelineError::MalformedFrame(format!("frame is not UTF-8: {e}")))?;
    let doc = Document::parse(text.trim())
        .map_err(|e| PipelineError::MalformedFrame(format!("invalid XML: {e}")))?;

    let msg = doc.root_element();
    if msg.tag_name().name() != ROOT_TAG {
        return Err(PipelineError::UnexpectedRoot(msg.tag_name().name().to_string()));
    }

    if child(msg, HISTORY_TAG).is_some() {
        return Ok(DecodedFrame::History);
    }

    let time_str = required_text(msg, "time")?;
    let meter_time = Time::parse(time_str, format_description!("[hour]:[minute]:[second]"))
        .map_err(|e| PipelineError::MalformedFrame(format!("invalid time '{time_str}': {e}")))?;

    let mut channels = [None; CHANNEL_COUNT];
    for (idx, slot) in channels.iter_mut().enumerate() {
        let watts = child(msg, &format!("ch{}", idx + 1)).and_then(|ch| child(ch, "watts"));
        if let Some(watts) = watts {
            let value = parse_text(watts, "watts")?;
            *slot = Some(ElectricReading::new(value));
        }
    }

    Ok(DecodedFrame::RealTime(RealTimeReading {
        source: required_text(msg, "src")?.to_string(),
        age_secs: parse_field(msg, "dsb")?,
        meter_time,
        temperature_celsius: parse_field(msg, "tmpr")?,
        sensor_id: parse_field(msg, "sensor")?,
        radio_id: parse_field(msg, "id")?,
        sensor_type: SensorType::from(parse_field::<u8>(msg, "type")?),
        channels,
    }))
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.has_tag_name(tag))
}

fn required_text<'a>(node: Node<'a, '_>, tag: &str) -> Result<&'a str, PipelineError> {
    let field = child(node, tag)
        .ok_or_else(|| PipelineError::MalformedFrame(format!("missing <{tag}> element")))?;
    Ok(field.text().map(str::trim).unwrap_or(""))
}

fn parse_text<T>(node: Node<'_, '_>, tag: &str) -> Result<T, PipelineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = node.text().map(str::trim).unwrap_or("");
    raw.parse()
        .map_err(|e| PipelineError::MalformedFrame(format!("invalid <{tag}> value '{raw}': {e}")))
}

fn parse_field<T>(node: Node<'_, '_>, tag: &str) -> Result<T, PipelineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let field = child(node, tag)
        .ok_or_else(|| PipelineError::MalformedFrame(format!("missing <{tag}> element")))?;
    parse_text(field, tag)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MessageDecoder;

#[async_trait::async_trait]
impl Transform<Vec<u8>, DecodedFrame> for MessageDecoder {
    async fn apply(&self, input: Envelope<Vec<u8>>) -> Result<Envelope<DecodedFrame>, PipelineError> {
        match decode_frame(&input.payload) {
            Ok(payload) => Ok(Envelope {
                payload,
                received_at: input.received_at,
            }),
            Err(e) => {
                metrics::counter!("cc128_decode_errors_total").increment(1);
                Err(e)
            }
        }
    }
}
