pub mod cc128_message;
pub mod serial_line;

pub use cc128_message::{decode_frame, DecodedFrame, MessageDecoder};
pub use serial_line::SerialLineSource;
