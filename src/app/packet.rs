use crate::err::AppError;
use crate::link::ByteBuffer;

const CONTROL_DATA: u8 = 0x01;
const CONTROL_START: u8 = 0x02;
const CONTROL_END: u8 = 0x03;

const FIELD_FILE_SIZE: u8 = 0x01;
const FIELD_FILE_NAME: u8 = 0x02;

/// The three application-layer packet types carried inside link-layer
/// information frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start { file_size: u64, file_name: String },
    Data { sequence: u8, payload: Vec<u8> },
    End,
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Start { file_size, file_name } => encode_start(*file_size, file_name),
            Packet::Data { sequence, payload } => {
                let mut buf = ByteBuffer::with_capacity(4 + payload.len());
                buf.push(CONTROL_DATA);
                buf.push(*sequence);
                buf.push((payload.len() / 256) as u8);
                buf.push((payload.len() % 256) as u8);
                buf.push_slice(payload);
                buf.into_vec()
            }
            Packet::End => vec![CONTROL_END],
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AppError> {
        match bytes.first() {
            Some(&CONTROL_DATA) => decode_data(bytes),
            Some(&CONTROL_START) => decode_start(bytes),
            Some(&CONTROL_END) => Ok(Packet::End),
            Some(_) => Err(AppError::Malformed("unrecognised packet control byte")),
            None => Err(AppError::Malformed("empty packet")),
        }
    }
}

fn encode_start(file_size: u64, file_name: &str) -> Vec<u8> {
    let size_bytes = minimal_le_bytes(file_size);
    let name_bytes = file_name.as_bytes();

    let mut buf = ByteBuffer::with_capacity(5 + size_bytes.len() + name_bytes.len());
    buf.push(CONTROL_START);
    buf.push(FIELD_FILE_SIZE);
    buf.push(size_bytes.len() as u8);
    buf.push_slice(&size_bytes);
    buf.push(FIELD_FILE_NAME);
    buf.push(name_bytes.len() as u8);
    buf.push_slice(name_bytes);
    buf.into_vec()
}

fn decode_start(bytes: &[u8]) -> Result<Packet, AppError> {
    let size_field = *bytes.get(1).ok_or(AppError::Malformed("truncated START"))?;
    if size_field != FIELD_FILE_SIZE {
        return Err(AppError::Malformed("START is missing the file size field"));
    }
    let size_len = *bytes.get(2).ok_or(AppError::Malformed("truncated START"))? as usize;
    let size_bytes = bytes
        .get(3..3 + size_len)
        .ok_or(AppError::Malformed("truncated START file size"))?;
    let file_size = le_bytes_to_u64(size_bytes);

    let rest = &bytes[3 + size_len..];
    let name_field = *rest.first().ok_or(AppError::Malformed("truncated START"))?;
    if name_field != FIELD_FILE_NAME {
        return Err(AppError::Malformed("START is missing the file name field"));
    }
    let name_len = *rest.get(1).ok_or(AppError::Malformed("truncated START"))? as usize;
    let name_bytes = rest
        .get(2..2 + name_len)
        .ok_or(AppError::Malformed("truncated START file name"))?;
    let file_name = String::from_utf8(name_bytes.to_vec())
        .map_err(|_| AppError::Malformed("file name is not valid UTF-8"))?;

    Ok(Packet::Start { file_size, file_name })
}

fn decode_data(bytes: &[u8]) -> Result<Packet, AppError> {
    let sequence = *bytes.get(1).ok_or(AppError::Malformed("truncated data packet"))?;
    let size_hi = *bytes.get(2).ok_or(AppError::Malformed("truncated data packet"))? as usize;
    let size_lo = *bytes.get(3).ok_or(AppError::Malformed("truncated data packet"))? as usize;
    let len = size_hi * 256 + size_lo;
    let payload = bytes
        .get(4..4 + len)
        .ok_or(AppError::Malformed("data packet shorter than declared length"))?
        .to_vec();
    Ok(Packet::Data { sequence, payload })
}

fn minimal_le_bytes(mut value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let mut bytes = Vec::new();
    while value > 0 {
        bytes.push((value & 0xFF) as u8);
        value >>= 8;
    }
    bytes
}

fn le_bytes_to_u64(bytes: &[u8]) -> u64 {
    bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
