use super::constants::{RX_ADDR, TX_ADDR};
use super::Command;

/// Which end of the link this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Tx,
    Rx,
}

impl Role {
    /// This role's own address: used on frames it sends as a command, and
    /// expected on frames the peer sends as a response.
    pub fn own_addr(self) -> u8 {
        match self {
            Role::Tx => TX_ADDR,
            Role::Rx => RX_ADDR,
        }
    }

    /// The peer's address: used on frames this role sends as a response,
    /// and expected on frames the peer sends as a command.
    pub fn peer_addr(self) -> u8 {
        match self {
            Role::Tx => RX_ADDR,
            Role::Rx => TX_ADDR,
        }
    }

    /// Whether `(command, address)` is a legal pair to receive in this role.
    ///
    /// A command always carries its sender's own address, so an incoming
    /// command must carry the peer's address. A response always carries the
    /// address of whoever it's addressed *to*, so an incoming response must
    /// carry our own address.
    pub fn accepts(self, command: Command, address: u8) -> bool {
        if command.is_command() {
            address == self.peer_addr()
        } else {
            address == self.own_addr()
        }
    }
}
