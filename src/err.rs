use crate::link::Command;

/// Errors raised by the link layer.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("failed to open transport: {0}")]
    TransportOpen(#[source] std::io::Error),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake failed: no UA received within {0} retransmissions")]
    HandshakeFailed(u32),

    #[error("peer unresponsive: exhausted {0} retransmissions of {1:?}")]
    PeerUnresponsive(u32, Command),

    #[error("connection is already closed")]
    Closed,

    #[error("end of stream: peer initiated disconnect")]
    EndOfStream,

    #[error("payload of {0} bytes exceeds the {1}-byte information field limit")]
    PayloadTooLarge(usize, usize),
}

/// Errors raised by the application layer built on top of the link.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("unexpected packet, expected {expected}")]
    UnexpectedPacket { expected: &'static str },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file name has no extension to preserve")]
    MissingExtension,
}
