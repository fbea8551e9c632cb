use time::{OffsetDateTime, Time};

/// Number of current-clamp channels carried by every reading.
///
/// The meter only reports the channels it has clamps fitted for, but readings
/// always expose all of them so that consumers can index by channel number.
pub const CHANNEL_COUNT: usize = 9;

/// Instantaneous power on a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectricReading {
    pub watts: u32,
}

impl ElectricReading {
    pub fn new(watts: u32) -> Self {
        Self { watts }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    Electricity,
    Other(u8),
}

impl From<u8> for SensorType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Electricity,
            n => Self::Other(n),
        }
    }
}

/// A decoded real-time message, before it has been placed on the calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct RealTimeReading {
    pub source: String,
    /// Age reported by the meter in its `dsb` field.
    pub age_secs: u32,
    /// Time of day on the meter's own clock. The meter has no notion of date.
    pub meter_time: Time,
    pub temperature_celsius: f64,
    pub sensor_id: u32,
    pub radio_id: u32,
    pub sensor_type: SensorType,
    /// Slot `i` holds channel `i + 1`.
    pub channels: [Option<ElectricReading>; CHANNEL_COUNT],
}

impl RealTimeReading {
    /// Populated channels as `(zero-based index, reading)` pairs.
    pub fn populated_channels(&self) -> impl Iterator<Item = (usize, ElectricReading)> + '_ {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(idx, ch)| ch.map(|r| (idx, r)))
    }

    pub fn stamp(self, timestamp: OffsetDateTime) -> StampedReading {
        StampedReading {
            timestamp,
            reading: self,
        }
    }
}

/// A real-time reading with its resolved absolute timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedReading {
    pub timestamp: OffsetDateTime,
    pub reading: RealTimeReading,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, time};

    fn reading_with(channels: [Option<ElectricReading>; CHANNEL_COUNT]) -> RealTimeReading {
        RealTimeReading {
            source: "CC128-v0.11".to_string(),
            age_secs: 89,
            meter_time: time!(13:02:39),
            temperature_celsius: 18.7,
            sensor_id: 0,
            radio_id: 1234,
            sensor_type: SensorType::Electricity,
            channels,
        }
    }

    #[test]
    fn populated_channels_skips_empty_slots_and_keeps_indices() {
        let mut channels = [None; CHANNEL_COUNT];
        channels[0] = Some(ElectricReading::new(345));
        channels[8] = Some(ElectricReading::new(7));
        let r = reading_with(channels);

        let populated: Vec<_> = r.populated_channels().collect();
        assert_eq!(
            populated,
            vec![(0, ElectricReading::new(345)), (8, ElectricReading::new(7))]
        );
    }

    #[test]
    fn sensor_type_maps_one_to_electricity() {
        assert_eq!(SensorType::from(1), SensorType::Electricity);
        assert_eq!(SensorType::from(2), SensorType::Other(2));
    }

    #[test]
    fn stamp_keeps_reading_intact() {
        let r = reading_with([None; CHANNEL_COUNT]);
        let ts = datetime!(2024-01-01 13:02:39 UTC);
        let stamped = r.clone().stamp(ts);
        assert_eq!(stamped.timestamp, ts);
        assert_eq!(stamped.reading, r);
    }
}
