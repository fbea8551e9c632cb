use std::{pin::Pin, time::SystemTime};

use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::pipeline::{Envelope, PipelineError, Source};

pub const BAUD_RATE: u32 = 57_600;

/// Line-framed byte source for the meter.
///
/// Every line is one frame. A read that returns no bytes means the meter has
/// stopped talking, which ends the stream with `TransportTimeout`.
pub struct SerialLineSource<R> {
    name: String,
    reader: tokio::sync::Mutex<Option<R>>,
}

impl SerialLineSource<BufReader<SerialStream>> {
    /// Open the meter's serial port at 57600 8N1 with RTS/CTS flow control.
    pub fn open(port: &str) -> Result<Self, PipelineError> {
        tracing::warn!(port, "connecting to CC-128 meter");
        let stream = tokio_serial::new(port, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::Hardware)
            .open_native_async()
            .map_err(|e| PipelineError::Transport(format!("failed to open {port}: {e}")))?;

        Ok(Self::from_reader(port, BufReader::new(stream)))
    }
}

impl<R> SerialLineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn from_reader(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader: tokio::sync::Mutex::new(Some(reader)),
        }
    }
}

#[async_trait::async_trait]
impl<R> Source<Vec<u8>> for SerialLineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<Vec<u8>>, PipelineError>> + Send>> {
        let taken = self.reader.lock().await.take();
        let Some(mut reader) = taken else {
            let err = PipelineError::Transport(format!("{} is already being read", self.name));
            return Box::pin(futures::stream::once(async move { Err::<Envelope<Vec<u8>>, _>(err) }));
        };

        let name = self.name.clone();
        let s = async_stream::try_stream! {
            loop {
                let mut line = Vec::new();
                let n = reader
                    .read_until(b'\n', &mut line)
                    .await
                    .map_err(|e| PipelineError::Transport(format!("read from {name} failed: {e}")))?;
                if n == 0 {
                    Err::<(), _>(PipelineError::TransportTimeout)?;
                }
                tracing::debug!("RX: {:?}", String::from_utf8_lossy(&line));

                yield Envelope {
                    payload: line,
                    received_at: SystemTime::now(),
                };
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;

    fn source(bytes: &[u8]) -> SerialLineSource<BufReader<Cursor<Vec<u8>>>> {
        SerialLineSource::from_reader("test", BufReader::new(Cursor::new(bytes.to_vec())))
    }

    #[tokio::test]
    async fn yields_one_frame_per_line_then_times_out() {
        let src = source(b"<msg>a</msg>\r\n<msg>b</msg>\r\n");
        let mut frames = src.stream().await;

        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(first.payload, b"<msg>a</msg>\r\n");
        let second = frames.next().await.unwrap().unwrap();
        assert_eq!(second.payload, b"<msg>b</msg>\r\n");

        let end = frames.next().await.unwrap();
        assert!(matches!(end, Err(PipelineError::TransportTimeout)));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_input_is_a_timeout_not_an_empty_frame() {
        let src = source(b"");
        let mut frames = src.stream().await;
        assert!(matches!(
            frames.next().await,
            Some(Err(PipelineError::TransportTimeout))
        ));
    }

    #[tokio::test]
    async fn stream_can_only_be_taken_once() {
        let src = source(b"<msg/>\n");
        let _first = src.stream().await;
        let mut second = src.stream().await;
        assert!(matches!(
            second.next().await,
            Some(Err(PipelineError::Transport(_)))
        ));
    }
}
