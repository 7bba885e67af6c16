//! Whole-file transfer built on top of the link layer: chunks a file into
//! START/DATA/END packets on send, and reassembles them on receive.

mod packet;

pub use packet::Packet;

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::err::AppError;
use crate::link::{Connection, Transport, MAX_PAYLOAD};

/// control byte + sequence byte + two length bytes, per [`Packet::Data`].
const DATA_OVERHEAD: usize = 4;

/// Reads `path` and sends it over `conn` as a START packet, a run of DATA
/// packets, and a closing END packet.
pub fn send_file<T: Transport + Send + 'static>(conn: &mut Connection<T>, path: &Path) -> Result<(), AppError> {
    let data = fs::read(path)?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or(AppError::Malformed("source path has no file name"))?
        .to_string();

    info!("sending {file_name} ({} bytes)", data.len());

    let start = Packet::Start {
        file_size: data.len() as u64,
        file_name: file_name.clone(),
    };
    conn.write(&start.encode())?;

    let chunk_size = MAX_PAYLOAD - DATA_OVERHEAD;
    for (sequence, chunk) in data.chunks(chunk_size.max(1)).enumerate() {
        let packet = Packet::Data {
            sequence: (sequence % 256) as u8,
            payload: chunk.to_vec(),
        };
        conn.write(&packet.encode())?;
        debug!("sent data packet {sequence} ({} bytes)", chunk.len());
    }

    conn.write(&Packet::End.encode())?;

    info!("transfer complete");
    Ok(())
}

/// Receives a START/DATA*/END sequence from `conn` and writes the
/// reassembled file under `output_dir`, returning the path written.
pub fn receive_file<T: Transport + Send + 'static>(
    conn: &mut Connection<T>,
    output_dir: &Path,
) -> Result<PathBuf, AppError> {
    let (file_size, file_name) = match Packet::decode(&conn.read()?)? {
        Packet::Start { file_size, file_name } => (file_size, file_name),
        _ => return Err(AppError::UnexpectedPacket { expected: "START" }),
    };
    info!("receiving {file_name} ({file_size} bytes)");

    let mut buffer = Vec::with_capacity(file_size as usize);
    loop {
        match Packet::decode(&conn.read()?)? {
            Packet::Data { sequence, payload } => {
                debug!("received data packet {sequence} ({} bytes)", payload.len());
                buffer.extend_from_slice(&payload);
            }
            Packet::End => break,
            Packet::Start { .. } => return Err(AppError::UnexpectedPacket { expected: "DATA or END" }),
        }
    }

    if buffer.len() as u64 != file_size {
        warn!("received {} bytes, START advertised {file_size}", buffer.len());
    }

    let output_path = output_path_for(output_dir, &file_name)?;
    fs::write(&output_path, &buffer)?;
    info!("wrote {}", output_path.display());
    Ok(output_path)
}

fn output_path_for(dir: &Path, file_name: &str) -> Result<PathBuf, AppError> {
    let path = Path::new(file_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    let extension = path.extension().and_then(|e| e.to_str()).ok_or(AppError::MissingExtension)?;
    Ok(dir.join(format!("{stem}_received.{extension}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::LoopbackTransport;
    use crate::link::Role;
    use std::thread;
    use std::time::Duration;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("serial-link-test-{label}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn send_then_receive_round_trips_small_file() {
        let dir = scratch_dir("app-round-trip");
        let source = dir.join("note.txt");
        fs::write(&source, b"hello, stop-and-wait").unwrap();

        let (a, b) = LoopbackTransport::pair();
        let timeout = Duration::from_millis(50);
        let tx_handle = thread::spawn(move || Connection::open(Role::Tx, a, timeout, 3).unwrap());
        let mut rx = Connection::open(Role::Rx, b, timeout, 3).unwrap();
        let mut tx = tx_handle.join().unwrap();

        let source_for_sender = source.clone();
        let sender = thread::spawn(move || send_file(&mut tx, &source_for_sender).unwrap());
        let written = receive_file(&mut rx, &dir).unwrap();
        sender.join().unwrap();

        assert_eq!(written, dir.join("note_received.txt"));
        assert_eq!(fs::read(&written).unwrap(), b"hello, stop-and-wait");
    }

    #[test]
    fn receive_file_rejects_missing_extension() {
        let dir = scratch_dir("app-missing-ext");
        let source = dir.join("noext");
        fs::write(&source, b"data").unwrap();

        let (a, b) = LoopbackTransport::pair();
        let timeout = Duration::from_millis(50);
        let tx_handle = thread::spawn(move || Connection::open(Role::Tx, a, timeout, 3).unwrap());
        let mut rx = Connection::open(Role::Rx, b, timeout, 3).unwrap();
        let mut tx = tx_handle.join().unwrap();

        let source_for_sender = source.clone();
        let sender = thread::spawn(move || send_file(&mut tx, &source_for_sender).unwrap());
        let result = receive_file(&mut rx, &dir);
        sender.join().unwrap();

        assert!(matches!(result, Err(AppError::MissingExtension)));
    }
}
