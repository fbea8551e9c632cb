use std::{fmt, pin::Pin, time::SystemTime};

use cc128_client::domain::{RealTimeReading, StampedReading};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    sinks::Dispatcher,
    sources::{DecodedFrame, MessageDecoder},
    transform::ClockReconciler,
};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("timed out waiting for a frame from the meter")]
    TransportTimeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),
    #[error("response code {status} while requesting {url}")]
    RequestFailed { url: String, status: u16 },
    #[error("sink error: {0}")]
    Sink(String),
    #[error("{0} output is not implemented")]
    NotImplemented(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

/// An output destination. Each append must be complete (written and flushed)
/// by the time it returns.
#[async_trait::async_trait]
pub trait Sink: Send {
    fn name(&self) -> &'static str;

    async fn append(&mut self, reading: &StampedReading) -> Result<(), PipelineError>;

    async fn close(&mut self) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub readings: u64,
    pub history_frames: u64,
}

pub struct Pipeline<S> {
    pub source: S,
    pub decoder: MessageDecoder,
    pub clock: ClockReconciler,
    pub dispatcher: Dispatcher,
}

impl<S> Pipeline<S>
where
    S: Source<Vec<u8>> + Send + Sync + 'static,
{
    /// Drive frames through decode, clock resolution and dispatch until the
    /// token is cancelled or a stage fails.
    ///
    /// Cancellation is only observed after a reading has been dispatched to
    /// every sink, so reads and writes are never abandoned halfway.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary, PipelineError> {
        let mut state = LifecycleState::Starting;
        let mut summary = RunSummary::default();
        let mut frames = self.source.stream().await;

        transition(&mut state, LifecycleState::Running);
        let outcome = loop {
            let frame = match frames.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break Err(e),
                None => break Err(PipelineError::TransportTimeout),
            };
            metrics::counter!("cc128_frames_received_total").increment(1);

            let reading = match self.decoder.apply(frame).await {
                Ok(Envelope {
                    payload: DecodedFrame::RealTime(reading),
                    received_at,
                }) => Envelope {
                    payload: reading,
                    received_at,
                },
                Ok(Envelope {
                    payload: DecodedFrame::History,
                    ..
                }) => {
                    tracing::warn!("ignoring history message");
                    metrics::counter!("cc128_history_frames_total").increment(1);
                    summary.history_frames += 1;
                    continue;
                }
                Err(e) => break Err(e),
            };

            if let Err(e) = self.dispatch(reading).await {
                break Err(e);
            }
            summary.readings += 1;

            if cancel.is_cancelled() {
                transition(&mut state, LifecycleState::Draining);
                break Ok(());
            }
        };

        self.dispatcher.close_all().await;
        transition(&mut state, LifecycleState::Stopped);

        outcome.map(|()| summary)
    }

    async fn dispatch(&mut self, reading: Envelope<RealTimeReading>) -> Result<(), PipelineError> {
        let stamped = self.clock.apply(reading).await?;
        tracing::debug!(
            timestamp = %stamped.payload.timestamp,
            temperature = stamped.payload.reading.temperature_celsius,
            "dispatching reading"
        );
        self.dispatcher.append(&stamped.payload).await?;
        metrics::counter!("cc128_readings_dispatched_total").increment(1);
        Ok(())
    }
}

fn transition(state: &mut LifecycleState, next: LifecycleState) {
    tracing::info!(from = %state, to = %next, "lifecycle transition");
    *state = next;
}
