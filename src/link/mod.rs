//! Reliable byte-stuffed stop-and-wait link layer.

mod byte_buffer;
mod command;
mod connection;
mod constants;
mod dispatcher;
mod frame;
mod role;
mod timer;
mod transport;

pub use byte_buffer::ByteBuffer;
pub use command::Command;
pub use connection::{Connection, Stats};
pub use constants::MAX_PAYLOAD;
pub use frame::{Frame, RxOutcome};
pub use role::Role;
pub use transport::{Config, SerialTransport, Transport};

/// In-memory transports for exercising the protocol without a real port.
pub mod testing {
    pub use super::transport::testing::*;
}
