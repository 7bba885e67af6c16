use super::constants::{ESC, ESC_ESC, ESC_FLAG, FLAG, RX_ADDR, TX_ADDR};
use super::{Command, Role};

/// A single decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub command: Command,
    pub information: Option<Vec<u8>>,
}

impl Frame {
    pub fn supervisory(address: u8, command: Command) -> Self {
        Self {
            address,
            command,
            information: None,
        }
    }

    pub fn information_frame(address: u8, seq: u8, payload: Vec<u8>) -> Self {
        Self {
            address,
            command: Command::Info(seq),
            information: Some(payload),
        }
    }

    /// Serialises this frame onto the wire, applying byte stuffing to the
    /// payload and trailing BCC2 of information frames.
    pub fn encode(&self) -> Vec<u8> {
        let command = self.command.to_byte();
        let bcc1 = self.address ^ command;

        let mut out = Vec::with_capacity(6 + self.information.as_ref().map_or(0, Vec::len));
        out.push(FLAG);
        out.push(self.address);
        out.push(command);
        out.push(bcc1);

        if let Some(payload) = &self.information {
            let bcc2 = payload.iter().fold(0u8, |acc, b| acc ^ b);
            for &byte in payload {
                stuff(&mut out, byte);
            }
            stuff(&mut out, bcc2);
        }

        out.push(FLAG);
        out
    }
}

fn stuff(out: &mut Vec<u8>, byte: u8) {
    match byte {
        FLAG => {
            out.push(ESC);
            out.push(ESC_FLAG);
        }
        ESC => {
            out.push(ESC);
            out.push(ESC_ESC);
        }
        other => out.push(other),
    }
}

/// Outcome of decoding one frame: either a clean frame, or an information
/// frame whose body failed its BCC2 check (never surfaced to the caller,
/// only used by the dispatcher to issue a REJ).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxOutcome {
    Frame(Frame),
    Corrupt { address: u8, seq: u8 },
}

#[derive(Debug)]
enum RecvState {
    Start,
    FlagRcv,
    ARcv {
        address: u8,
    },
    CRcv {
        address: u8,
        command: u8,
    },
    BccRcv {
        address: u8,
        command: u8,
    },
    DataRcv {
        address: u8,
        command: u8,
        body: Vec<u8>,
    },
    EscRcv {
        address: u8,
        command: u8,
        body: Vec<u8>,
    },
}

/// Drives the byte-at-a-time receive state machine described in the frame
/// syntax until a full frame (or a corrupt information frame) is read.
///
/// `next_byte` is called for every byte the machine needs; returning `Err`
/// aborts the read immediately (transport failure, EOF, or wake-up).
pub fn read_frame<E>(
    role: Role,
    mut next_byte: impl FnMut() -> Result<u8, E>,
) -> Result<RxOutcome, E> {
    let mut state = RecvState::Start;
    loop {
        let byte = next_byte()?;
        state = match state {
            RecvState::Start => {
                if byte == FLAG {
                    RecvState::FlagRcv
                } else {
                    RecvState::Start
                }
            }
            RecvState::FlagRcv => {
                if byte == FLAG {
                    RecvState::FlagRcv
                } else if byte == TX_ADDR || byte == RX_ADDR {
                    RecvState::ARcv { address: byte }
                } else {
                    RecvState::Start
                }
            }
            RecvState::ARcv { address } => {
                if byte == FLAG {
                    RecvState::FlagRcv
                } else if let Some(command) = Command::from_byte(byte) {
                    if role.accepts(command, address) {
                        RecvState::CRcv {
                            address,
                            command: byte,
                        }
                    } else {
                        RecvState::Start
                    }
                } else {
                    RecvState::Start
                }
            }
            RecvState::CRcv { address, command } => {
                if byte == address ^ command {
                    RecvState::BccRcv { address, command }
                } else if byte == FLAG {
                    RecvState::FlagRcv
                } else {
                    RecvState::Start
                }
            }
            RecvState::BccRcv { address, command } => {
                if super::constants::is_information(command) {
                    RecvState::DataRcv {
                        address,
                        command,
                        body: Vec::new(),
                    }
                } else if byte == FLAG {
                    let frame = Frame::supervisory(
                        address,
                        Command::from_byte(command).expect("validated at A_RCV"),
                    );
                    return Ok(RxOutcome::Frame(frame));
                } else {
                    RecvState::Start
                }
            }
            RecvState::DataRcv {
                address,
                command,
                mut body,
            } => {
                if byte == ESC {
                    RecvState::EscRcv {
                        address,
                        command,
                        body,
                    }
                } else if byte == FLAG {
                    return Ok(finish_information(address, command, body));
                } else {
                    body.push(byte);
                    RecvState::DataRcv {
                        address,
                        command,
                        body,
                    }
                }
            }
            RecvState::EscRcv {
                address,
                command,
                mut body,
            } => {
                match byte {
                    ESC_FLAG => body.push(FLAG),
                    ESC_ESC => body.push(ESC),
                    _ => {
                        // Unrecognised escape: treat the frame as corrupt,
                        // same as a body-BCC failure.
                        let seq = (command >> 6) & 1;
                        return Ok(RxOutcome::Corrupt { address, seq });
                    }
                }
                RecvState::DataRcv {
                    address,
                    command,
                    body,
                }
            }
        };
    }
}

fn finish_information(address: u8, command: u8, mut body: Vec<u8>) -> RxOutcome {
    let seq = (command >> 6) & 1;
    let Some(received_bcc2) = body.pop() else {
        return RxOutcome::Corrupt { address, seq };
    };
    let expected = body.iter().fold(0u8, |acc, b| acc ^ b);
    if expected == received_bcc2 {
        RxOutcome::Frame(Frame::information_frame(address, seq, body))
    } else {
        RxOutcome::Corrupt { address, seq }
    }
}
