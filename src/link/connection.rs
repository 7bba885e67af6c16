use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, trace};

use crate::err::LinkError;

use super::constants::MAX_PAYLOAD;
use super::dispatcher::expect_frame;
use super::frame::Frame;
use super::timer::RetransmitTimer;
use super::transport::{Config, Transport};
use super::{Command, Role};

/// Running counters kept for the lifetime of a connection, surfaced to the
/// application layer so a CLI can print a final transfer summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub frames_sent: u32,
    pub frames_received: u32,
    pub retransmissions: u32,
    pub rejects_sent: u32,
    pub rejects_received: u32,
}

/// One end of an established link, bound to a concrete [`Transport`].
pub struct Connection<T: Transport> {
    pub(super) role: Role,
    pub(super) transport: Arc<Mutex<T>>,
    pub(super) timer: RetransmitTimer,
    pub(super) tx_seq: u8,
    pub(super) rx_seq: u8,
    pub(super) closed: bool,
    /// Set once this end has sent its own DISC in response to the peer's,
    /// whether that happened inside an explicit `close()` call or was
    /// auto-handled by the dispatcher while `read`/`write` was awaiting
    /// something else. Lets a later `close()` skip re-sending it.
    pub(super) disc_sent: bool,
    pub(super) stats: Stats,
    saved_config: Config,
    timeout: Duration,
}

impl<T: Transport + Send + 'static> Connection<T> {
    /// Performs the SET/UA handshake (transmitter) or waits for it
    /// (receiver) and returns an established connection.
    pub fn open(
        role: Role,
        transport: T,
        timeout: Duration,
        max_retransmissions: u32,
    ) -> Result<Self, LinkError> {
        let saved_config = transport.snapshot();
        let transport = Arc::new(Mutex::new(transport));
        let timer = RetransmitTimer::spawn(transport.clone(), timeout, max_retransmissions);

        let mut conn = Connection {
            role,
            transport,
            timer,
            tx_seq: 0,
            rx_seq: 0,
            closed: false,
            disc_sent: false,
            stats: Stats::default(),
            saved_config,
            timeout,
        };

        debug!("{role:?}: starting handshake");
        match role {
            Role::Tx => {
                let set = Frame::supervisory(role.own_addr(), Command::Set);
                conn.send_and_arm(&set)?;
                match expect_frame(&mut conn, Command::Ua) {
                    Ok(_) => {
                        conn.stats.retransmissions += conn.timer.retransmissions_sent();
                        debug!("{role:?}: handshake complete");
                        Ok(conn)
                    }
                    Err(LinkError::PeerUnresponsive(n, _)) => Err(LinkError::HandshakeFailed(n)),
                    Err(err) => Err(err),
                }
            }
            Role::Rx => {
                expect_frame(&mut conn, Command::Set)?;
                debug!("{role:?}: handshake complete");
                Ok(conn)
            }
        }
    }

    /// Sends one information frame and blocks for its acknowledgement,
    /// retransmitting on timeout or REJ until it is accepted or the peer
    /// is declared unresponsive.
    pub fn write(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(LinkError::PayloadTooLarge(payload.len(), MAX_PAYLOAD));
        }

        let frame = Frame::information_frame(self.role.own_addr(), self.tx_seq, payload.to_vec());
        self.send_and_arm(&frame)?;

        let expected_ack = Command::Rr(self.tx_seq ^ 1);
        expect_frame(self, expected_ack)?;
        self.stats.retransmissions += self.timer.retransmissions_sent();
        self.tx_seq ^= 1;
        Ok(())
    }

    /// Blocks until the next information frame in sequence arrives and
    /// returns its payload, acknowledging it (and re-acknowledging any
    /// retransmitted duplicates) along the way.
    pub fn read(&mut self) -> Result<Vec<u8>, LinkError> {
        if self.closed {
            return Err(LinkError::EndOfStream);
        }
        let expected = Command::Info(self.rx_seq);
        let frame = expect_frame(self, expected)?;
        Ok(frame.information.unwrap_or_default())
    }

    /// Tears the link down. The transmitter sends DISC and waits for the
    /// receiver's DISC before acknowledging with UA; the receiver waits for
    /// DISC and replies with its own DISC, then waits for the final UA.
    ///
    /// If the peer's DISC already arrived unawaited (mid-`read`/`write`) the
    /// dispatcher will have auto-sent this end's own DISC and marked
    /// `closed` already; in that case this only completes the half of the
    /// handshake still outstanding, so a caller that then calls `close()`
    /// doesn't leave the peer retransmitting into a connection that will
    /// never answer. Idempotent: once fully torn down, later calls no-op.
    pub fn close(&mut self) -> Result<(), LinkError> {
        if self.closed && !self.disc_sent {
            return Ok(());
        }

        debug!("{:?}: starting teardown", self.role);
        match self.role {
            Role::Tx => {
                // The dispatcher itself replies UA as soon as it sees the
                // peer's DISC (mirroring SET's handling), whether that DISC
                // arrives here or was already observed mid-`write`, so there
                // is nothing left for this branch to send.
                if !self.closed {
                    let disc = Frame::supervisory(self.role.own_addr(), Command::Disc);
                    self.send_and_arm(&disc)?;
                    expect_frame(self, Command::Disc)?;
                    self.stats.retransmissions += self.timer.retransmissions_sent();
                }
            }
            Role::Rx => {
                if !self.disc_sent {
                    expect_frame(self, Command::Disc)?;
                }
                expect_frame(self, Command::Ua)?;
                self.stats.retransmissions += self.timer.retransmissions_sent();
                self.disc_sent = false;
            }
        }

        let mut transport = self.transport.lock().unwrap();
        transport.restore(self.saved_config)?;
        drop(transport);

        self.closed = true;
        debug!("{:?}: teardown complete", self.role);
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub(super) fn send_and_arm(&mut self, frame: &Frame) -> Result<(), LinkError> {
        trace!("sending {}", frame.command);
        let bytes = frame.encode();
        {
            let mut transport = self.transport.lock().unwrap();
            transport.write_all(&bytes)?;
        }
        self.stats.frames_sent += 1;
        self.timer.arm(bytes, self.timeout);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::LoopbackTransport;
    use std::thread;

    fn open_pair() -> (Connection<LoopbackTransport>, Connection<LoopbackTransport>) {
        let (a, b) = LoopbackTransport::pair();
        let timeout = Duration::from_millis(50);
        let tx_side = thread::spawn(move || Connection::open(Role::Tx, a, timeout, 3));
        let rx = Connection::open(Role::Rx, b, timeout, 3).unwrap();
        let tx = tx_side.join().unwrap().unwrap();
        (tx, rx)
    }

    #[test]
    fn handshake_establishes_both_ends() {
        let (_tx, _rx) = open_pair();
    }

    #[test]
    fn write_then_read_round_trips_payload() {
        let (mut tx, mut rx) = open_pair();
        let writer = thread::spawn(move || {
            tx.write(b"hello").unwrap();
            tx
        });
        let payload = rx.read().unwrap();
        assert_eq!(payload, b"hello");
        writer.join().unwrap();
    }

    #[test]
    fn alternating_sequence_bits_across_two_frames() {
        let (mut tx, mut rx) = open_pair();
        let writer = thread::spawn(move || {
            tx.write(b"one").unwrap();
            tx.write(b"two").unwrap();
            tx
        });
        assert_eq!(rx.read().unwrap(), b"one");
        assert_eq!(rx.read().unwrap(), b"two");
        writer.join().unwrap();
    }

    #[test]
    fn close_tears_down_both_ends() {
        let (mut tx, mut rx) = open_pair();
        let closer = thread::spawn(move || {
            tx.close().unwrap();
            tx
        });
        rx.close().unwrap();
        let tx = closer.join().unwrap();
        assert!(tx.closed);
        assert!(rx.closed);
    }

    #[test]
    fn write_after_close_is_rejected() {
        let (mut tx, mut rx) = open_pair();
        let closer = thread::spawn(move || {
            tx.close().unwrap();
            tx
        });
        rx.close().unwrap();
        let mut tx = closer.join().unwrap();
        assert!(matches!(tx.write(b"x"), Err(LinkError::Closed)));
    }

    #[test]
    fn close_is_idempotent_once_fully_torn_down() {
        let (mut tx, mut rx) = open_pair();
        let closer = thread::spawn(move || {
            tx.close().unwrap();
            tx.close().unwrap();
            tx
        });
        rx.close().unwrap();
        rx.close().unwrap();
        let tx = closer.join().unwrap();
        assert!(tx.closed);
        assert!(rx.closed);
    }

    /// TX closing while RX is still blocked in `read` (spec's DISC-instead-
    /// of-I scenario): RX's read must surface end-of-stream right away, and
    /// RX's own subsequent `close` must still complete cleanly instead of
    /// leaving TX to retransmit into a connection that never answers.
    #[test]
    fn disc_during_read_surfaces_end_of_stream_and_close_still_completes() {
        let (mut tx, mut rx) = open_pair();
        let closer = thread::spawn(move || {
            tx.close().unwrap();
            tx
        });
        assert!(matches!(rx.read(), Err(LinkError::EndOfStream)));
        rx.close().unwrap();
        let tx = closer.join().unwrap();
        assert!(tx.closed);
        assert!(rx.closed);
    }
}
