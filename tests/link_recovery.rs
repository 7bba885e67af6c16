//! Black-box recovery tests driving full `open`/`write`/`read`/`close`
//! sequences over a faulty transport, matching the loss and corruption
//! scenarios the protocol is meant to survive.

use std::thread;
use std::time::Duration;

use serial_link::testing::{FaultyTransport, LoopbackTransport};
use serial_link::{Connection, Role};

const TIMEOUT: Duration = Duration::from_millis(50);
const MAX_RETRANSMISSIONS: u32 = 5;

/// RX's first RR(1) acknowledgement is dropped outright; TX must time out,
/// retransmit the same I(0) frame, and receive the duplicate's fresh RR(1)
/// to complete the write.
#[test]
fn dropped_acknowledgement_triggers_one_retransmission() {
    let (tx_side, rx_side) = LoopbackTransport::pair();
    // RX's UA (handshake reply) is 5 bytes (offsets 0-4); its first RR(1)
    // reply to the I(0) frame is the next 5 bytes (offsets 5-9).
    let rx_side = FaultyTransport::new(rx_side)
        .drop_byte_at(5)
        .drop_byte_at(6)
        .drop_byte_at(7)
        .drop_byte_at(8)
        .drop_byte_at(9);

    let tx_handle = thread::spawn(move || Connection::open(Role::Tx, tx_side, TIMEOUT, MAX_RETRANSMISSIONS).unwrap());
    let mut rx = Connection::open(Role::Rx, rx_side, TIMEOUT, MAX_RETRANSMISSIONS).unwrap();
    let mut tx = tx_handle.join().unwrap();

    let writer = thread::spawn(move || {
        tx.write(b"A").unwrap();
        tx
    });
    assert_eq!(rx.read().unwrap(), b"A");
    let tx = writer.join().unwrap();

    assert_eq!(tx.stats().retransmissions, 1);
}

/// The single payload byte of TX's first I(0) frame is corrupted in
/// transit; RX must detect the bad BCC2, reply REJ(0), and TX must
/// retransmit the same frame once more, uncorrupted, to complete the write.
#[test]
fn corrupted_payload_triggers_reject_and_retransmission() {
    let (tx_side, rx_side) = LoopbackTransport::pair();
    // TX's SET is 5 bytes (offsets 0-4); the I(0) frame that follows is
    // FLAG, address, command, bcc1, payload[0], bcc2, FLAG — the single
    // payload byte for a one-byte payload lands at offset 9.
    let tx_side = FaultyTransport::new(tx_side).corrupt_byte_at(9);

    let tx_handle = thread::spawn(move || Connection::open(Role::Tx, tx_side, TIMEOUT, MAX_RETRANSMISSIONS).unwrap());
    let mut rx = Connection::open(Role::Rx, rx_side, TIMEOUT, MAX_RETRANSMISSIONS).unwrap();
    let mut tx = tx_handle.join().unwrap();

    let writer = thread::spawn(move || {
        tx.write(b"A").unwrap();
        tx
    });
    assert_eq!(rx.read().unwrap(), b"A");
    let tx = writer.join().unwrap();

    assert_eq!(tx.stats().rejects_received, 1);
    assert_eq!(tx.stats().retransmissions, 1);
}

/// A full send/receive/close cycle survives a single corrupted byte inside
/// the DISC frame TX sends: it must retransmit DISC once and still tear
/// the link down cleanly on both ends.
#[test]
fn corrupted_disc_byte_still_closes_cleanly() {
    let (tx_side, rx_side) = LoopbackTransport::pair();
    // TX's SET (5 bytes, offsets 0-4), one I(0) frame for "x" (7 bytes,
    // offsets 5-11), then DISC (5 bytes, offsets 12-16: FLAG, address,
    // command, bcc1, FLAG). Corrupting the command byte at offset 14 makes
    // it unrecognisable, so the frame is discarded and resynced off the
    // flags surrounding it; the retransmitted DISC parses cleanly.
    let tx_side = FaultyTransport::new(tx_side).corrupt_byte_at(14);

    let tx_handle = thread::spawn(move || Connection::open(Role::Tx, tx_side, TIMEOUT, MAX_RETRANSMISSIONS).unwrap());
    let mut rx = Connection::open(Role::Rx, rx_side, TIMEOUT, MAX_RETRANSMISSIONS).unwrap();
    let mut tx = tx_handle.join().unwrap();

    let writer = thread::spawn(move || {
        tx.write(b"x").unwrap();
        tx.close().unwrap();
        tx
    });
    assert_eq!(rx.read().unwrap(), b"x");
    rx.close().unwrap();
    let tx = writer.join().unwrap();

    assert!(tx.stats().retransmissions >= 1);
}
