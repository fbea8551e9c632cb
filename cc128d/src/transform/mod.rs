use std::{fmt, sync::Arc};

use crate::pipeline::{Envelope, PipelineError, Transform};
use cc128_client::domain::{RealTimeReading, StampedReading};
use chrono::{Offset, TimeZone};
use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// Place a meter time-of-day on the calendar.
///
/// With `use_system_clock` the meter's time is ignored and `now` is returned.
/// Otherwise the meter time is combined with `now`'s date, then moved a day
/// back or forward if that lands more than 12 hours away from `now`. This
/// assumes the two clocks never drift more than 12 hours apart.
pub fn resolve_timestamp(meter_time: Time, now: OffsetDateTime, use_system_clock: bool) -> OffsetDateTime {
    if use_system_clock {
        return now;
    }

    let candidate = now.replace_time(meter_time);
    let drift = candidate - now;
    if drift > Duration::hours(12) {
        candidate - Duration::days(1)
    } else if drift < -Duration::hours(12) {
        candidate + Duration::days(1)
    } else {
        candidate
    }
}

/// Maps an instant to the UTC offset local clocks showed at that instant.
pub trait LocalZone: Send + Sync + fmt::Debug {
    fn offset_at(&self, instant: OffsetDateTime) -> UtcOffset;
}

/// A zone that never changes offset.
impl LocalZone for UtcOffset {
    fn offset_at(&self, _instant: OffsetDateTime) -> UtcOffset {
        *self
    }
}

/// The host's configured time zone, daylight saving included.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostZone;

impl LocalZone for HostZone {
    fn offset_at(&self, instant: OffsetDateTime) -> UtcOffset {
        let seconds = chrono::Local
            .timestamp_opt(instant.unix_timestamp(), 0)
            .single()
            .map(|local| local.offset().fix().local_minus_utc());

        match seconds.map(UtcOffset::from_whole_seconds) {
            Some(Ok(offset)) => offset,
            _ => {
                tracing::warn!(%instant, "could not determine local UTC offset, using UTC");
                UtcOffset::UTC
            }
        }
    }
}

/// Stamps readings with an absolute time, measured from the instant each
/// frame was received and expressed in the zone's offset for that instant.
#[derive(Debug, Clone)]
pub struct ClockReconciler {
    use_system_clock: bool,
    zone: Arc<dyn LocalZone>,
}

impl ClockReconciler {
    pub fn new(use_system_clock: bool, zone: impl LocalZone + 'static) -> Self {
        Self {
            use_system_clock,
            zone: Arc::new(zone),
        }
    }
}

#[async_trait::async_trait]
impl Transform<RealTimeReading, StampedReading> for ClockReconciler {
    async fn apply(&self, input: Envelope<RealTimeReading>) -> Result<Envelope<StampedReading>, PipelineError> {
        let received = OffsetDateTime::from(input.received_at);
        let now = received.to_offset(self.zone.offset_at(received));
        let timestamp = resolve_timestamp(input.payload.meter_time, now, self.use_system_clock);

        Ok(Envelope {
            payload: input.payload.stamp(timestamp),
            received_at: input.received_at,
        })
    }
}
