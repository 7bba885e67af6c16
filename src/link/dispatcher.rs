use std::io;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::err::LinkError;

use super::connection::Connection;
use super::frame::{read_frame, Frame, RxOutcome};
use super::transport::Transport;
use super::{Command, Role};

const READ_POLL: Duration = Duration::from_millis(20);

/// What to do with one received frame, per the supervisory table.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    /// Send this frame immediately, independent of what the caller awaited.
    Reply(Frame),
    /// The frame the caller awaited. Stop waiting and hand it back.
    Deliver(Frame),
    /// Send an automatic reply, then stop waiting and hand the frame back.
    ReplyThenDeliver(Frame, Frame),
    /// A duplicate or otherwise irrelevant frame. Keep waiting.
    Ignore,
    /// The peer is tearing down the link while we were waiting on something else.
    PeerDisconnected,
}

/// Blocks (via short polling, so the retransmit timer can keep firing)
/// until a frame matching `awaited` arrives, auto-responding to anything
/// else per the supervisory table in the meantime.
pub fn expect_frame<T: Transport + Send + 'static>(
    conn: &mut Connection<T>,
    awaited: Command,
) -> Result<Frame, LinkError> {
    loop {
        if conn.timer.is_unresponsive() {
            return Err(LinkError::PeerUnresponsive(
                conn.timer.retransmissions_sent(),
                awaited,
            ));
        }

        let outcome = match read_one_frame(conn)? {
            Some(outcome) => outcome,
            None => continue,
        };

        match dispatch(conn, outcome, awaited)? {
            Action::Deliver(frame) => return Ok(frame),
            Action::Reply(frame) => {
                trace!("replying {}", frame.command);
                let mut transport = conn.transport.lock().unwrap();
                transport.write_all(&frame.encode())?;
            }
            Action::ReplyThenDeliver(reply, frame) => {
                trace!("replying {}", reply.command);
                let mut transport = conn.transport.lock().unwrap();
                transport.write_all(&reply.encode())?;
                drop(transport);
                return Ok(frame);
            }
            Action::Ignore => continue,
            Action::PeerDisconnected => {
                debug!("peer disconnected while awaiting {awaited}");
                return Err(LinkError::EndOfStream);
            }
        }
    }
}

fn read_one_frame<T: Transport>(conn: &mut Connection<T>) -> Result<Option<RxOutcome>, io::Error> {
    let deadline = Instant::now() + READ_POLL;
    let role = conn.role;
    let read = move || -> Result<u8, ReadAbort> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ReadAbort::TimedOut);
            }
            let mut transport = conn.transport.lock().unwrap();
            match transport.read_byte(remaining.min(Duration::from_millis(5))) {
                Ok(Some(byte)) => return Ok(byte),
                Ok(None) => {
                    drop(transport);
                    continue;
                }
                Err(err) => return Err(ReadAbort::Io(err)),
            }
        }
    };

    match read_frame(role, read) {
        Ok(outcome) => Ok(Some(outcome)),
        Err(ReadAbort::TimedOut) => Ok(None),
        Err(ReadAbort::Io(err)) => Err(err),
    }
}

enum ReadAbort {
    TimedOut,
    Io(io::Error),
}

fn dispatch<T: Transport + Send + 'static>(
    conn: &mut Connection<T>,
    outcome: RxOutcome,
    awaited: Command,
) -> Result<Action, LinkError> {
    match outcome {
        RxOutcome::Frame(frame) => handle_frame(conn, frame, awaited),
        RxOutcome::Corrupt { seq, .. } => {
            conn.stats.rejects_sent += 1;
            warn!("corrupt frame body, seq {seq}, replying REJ");
            Ok(Action::Reply(Frame::supervisory(conn.role.peer_addr(), Command::Rej(seq))))
        }
    }
}

fn handle_frame<T: Transport + Send + 'static>(
    conn: &mut Connection<T>,
    frame: Frame,
    awaited: Command,
) -> Result<Action, LinkError> {
    conn.stats.frames_received += 1;
    debug!("received {}", frame.command);

    match frame.command {
        Command::Set => {
            let reply = Frame::supervisory(conn.role.peer_addr(), Command::Ua);
            if awaited == Command::Set {
                Ok(Action::ReplyThenDeliver(reply, frame))
            } else {
                Ok(Action::Reply(reply))
            }
        }
        Command::Disc => {
            conn.closed = true;
            match conn.role {
                Role::Tx => {
                    let reply = Frame::supervisory(conn.role.peer_addr(), Command::Ua);
                    if awaited == Command::Disc {
                        Ok(Action::ReplyThenDeliver(reply, frame))
                    } else {
                        Ok(Action::Reply(reply))
                    }
                }
                Role::Rx => {
                    if !conn.disc_sent {
                        let disc = Frame::supervisory(conn.role.own_addr(), Command::Disc);
                        conn.send_and_arm(&disc)?;
                        conn.disc_sent = true;
                        debug!("peer hung up mid-exchange, echoing DISC");
                    }
                    if awaited == Command::Disc {
                        Ok(Action::Deliver(frame))
                    } else {
                        Ok(Action::PeerDisconnected)
                    }
                }
            }
        }
        Command::Ua => {
            if awaited == Command::Ua {
                conn.timer.disarm();
                Ok(Action::Deliver(frame))
            } else {
                Ok(Action::Ignore)
            }
        }
        Command::Rr(_) => {
            if frame.command == awaited {
                conn.timer.disarm();
                Ok(Action::Deliver(frame))
            } else {
                Ok(Action::Ignore)
            }
        }
        Command::Rej(_) => {
            conn.stats.rejects_received += 1;
            conn.timer.force();
            trace!("REJ received, forcing retransmission");
            if frame.command == awaited {
                Ok(Action::Deliver(frame))
            } else {
                Ok(Action::Ignore)
            }
        }
        Command::Info(seq) => {
            if seq == conn.rx_seq {
                let is_awaited = frame.command == awaited;
                conn.rx_seq ^= 1;
                let reply = Frame::supervisory(conn.role.peer_addr(), Command::Rr(conn.rx_seq));
                if is_awaited {
                    Ok(Action::ReplyThenDeliver(reply, frame))
                } else {
                    Ok(Action::Reply(reply))
                }
            } else {
                // Retransmitted duplicate of the frame we already
                // acknowledged: re-send the same RR, never deliver twice.
                Ok(Action::Reply(Frame::supervisory(conn.role.peer_addr(), Command::Rr(conn.rx_seq))))
            }
        }
    }
}
