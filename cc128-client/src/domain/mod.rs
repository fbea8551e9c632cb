mod reading;

pub use reading::{ElectricReading, RealTimeReading, SensorType, StampedReading, CHANNEL_COUNT};
