pub mod reading_queries;

pub use reading_queries::{channel_history, ensure_table, insert_channel_sample, validate_table_name, ChannelSample};
