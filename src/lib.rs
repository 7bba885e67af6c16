//! A reliable, stop-and-wait file transfer stack over a byte-oriented
//! serial link: framing and retransmission in [`link`], whole-file
//! chunking on top of it in [`app`].

mod app;
mod err;
mod link;

pub use app::{receive_file, send_file, Packet};
pub use err::{AppError, LinkError};
pub use link::{ByteBuffer, Command, Config, Connection, Frame, Role, SerialTransport, Stats, Transport, MAX_PAYLOAD};

/// In-memory transports for exercising the stack without a real serial port.
pub mod testing {
    pub use crate::link::testing::*;
}
