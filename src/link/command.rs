use super::constants::{i as info_cmd, is_information, rej, rr, DISC, SET, UA};

/// A decoded command or response byte, independent of its wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Set,
    Disc,
    Ua,
    /// Information frame carrying sequence bit `s`.
    Info(u8),
    Rr(u8),
    Rej(u8),
}

impl Command {
    /// Decodes a raw command byte. Returns `None` for a byte that is neither
    /// a recognised command nor a recognised response.
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte == SET {
            Some(Command::Set)
        } else if byte == DISC {
            Some(Command::Disc)
        } else if byte == UA {
            Some(Command::Ua)
        } else if is_information(byte) {
            Some(Command::Info((byte >> 6) & 1))
        } else if byte & 0x0F == 0x05 {
            Some(Command::Rr((byte >> 7) & 1))
        } else if byte & 0x0F == 0x01 {
            Some(Command::Rej((byte >> 7) & 1))
        } else {
            None
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Command::Set => SET,
            Command::Disc => DISC,
            Command::Ua => UA,
            Command::Info(seq) => info_cmd(seq),
            Command::Rr(expected) => rr(expected),
            Command::Rej(seq) => rej(seq),
        }
    }

    pub fn is_command(self) -> bool {
        matches!(self, Command::Set | Command::Disc | Command::Info(_))
    }

    pub fn is_response(self) -> bool {
        !self.is_command()
    }

    pub fn has_information(self) -> bool {
        matches!(self, Command::Info(_))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Set => write!(f, "SET"),
            Command::Disc => write!(f, "DISC"),
            Command::Ua => write!(f, "UA"),
            Command::Info(s) => write!(f, "I({s})"),
            Command::Rr(r) => write!(f, "RR({r})"),
            Command::Rej(r) => write!(f, "REJ({r})"),
        }
    }
}
