use std::io;
use std::time::Duration;

/// A snapshot of a transport's line configuration, taken before the link
/// layer applies its own settings and reapplied when the connection closes.
///
/// Transports with no real line configuration (the in-memory ones used in
/// tests) use `Config::default()`, which `Transport::restore`'s default
/// implementation treats as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub baud_rate: u32,
    pub data_bits: Option<serialport::DataBits>,
    pub parity: Option<serialport::Parity>,
    pub stop_bits: Option<serialport::StopBits>,
}

/// Byte-level channel the link layer runs over.
///
/// `read_byte` must not block longer than `timeout`; a timeout with no byte
/// available is `Ok(None)`, not an error. This is what lets the dispatcher's
/// receive loop poll between retransmit-timer expiries instead of blocking
/// forever on a single read.
pub trait Transport {
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>>;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// The line configuration in effect when this transport was opened.
    fn snapshot(&self) -> Config {
        Config::default()
    }

    /// Reapplies a configuration previously returned by `snapshot`.
    fn restore(&mut self, _cfg: Config) -> io::Result<()> {
        Ok(())
    }
}

fn to_io(err: serialport::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

/// A transport backed by a real serial port.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    original: Config,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> io::Result<Self> {
        let mut port = serialport::new(path, baud_rate).open().map_err(to_io)?;

        let original = Config {
            baud_rate: port.baud_rate().unwrap_or(baud_rate),
            data_bits: port.data_bits().ok(),
            parity: port.parity().ok(),
            stop_bits: port.stop_bits().ok(),
        };

        port.set_baud_rate(baud_rate).map_err(to_io)?;
        port.set_data_bits(serialport::DataBits::Eight).map_err(to_io)?;
        port.set_parity(serialport::Parity::None).map_err(to_io)?;
        port.set_stop_bits(serialport::StopBits::One).map_err(to_io)?;
        port.set_timeout(Duration::from_millis(10)).map_err(to_io)?;

        Ok(Self { port, original })
    }
}

impl Transport for SerialTransport {
    fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        self.port.set_timeout(timeout).map_err(to_io)?;

        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.port, bytes)
    }

    fn snapshot(&self) -> Config {
        self.original
    }

    /// Reapplies the line configuration found on the port when it was
    /// opened. The caller drops the transport immediately afterward.
    fn restore(&mut self, cfg: Config) -> io::Result<()> {
        self.port.set_baud_rate(cfg.baud_rate).map_err(to_io)?;
        if let Some(data_bits) = cfg.data_bits {
            self.port.set_data_bits(data_bits).map_err(to_io)?;
        }
        if let Some(parity) = cfg.parity {
            self.port.set_parity(parity).map_err(to_io)?;
        }
        if let Some(stop_bits) = cfg.stop_bits {
            self.port.set_stop_bits(stop_bits).map_err(to_io)?;
        }
        Ok(())
    }
}

/// In-memory transports for unit and integration tests.
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::mpsc::{channel, Receiver, Sender};

    /// One end of an in-memory duplex link. Use [`LoopbackTransport::pair`]
    /// to build a connected TX/RX pair.
    pub struct LoopbackTransport {
        tx: Sender<u8>,
        rx: Receiver<u8>,
    }

    impl LoopbackTransport {
        pub fn pair() -> (Self, Self) {
            let (tx_a, rx_a) = channel();
            let (tx_b, rx_b) = channel();
            (
                LoopbackTransport { tx: tx_a, rx: rx_b },
                LoopbackTransport { tx: tx_b, rx: rx_a },
            )
        }
    }

    impl Transport for LoopbackTransport {
        fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
            match self.rx.recv_timeout(timeout) {
                Ok(byte) => Ok(Some(byte)),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(None),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer transport dropped"))
                }
            }
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            for &byte in bytes {
                self.tx
                    .send(byte)
                    .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer transport dropped"))?;
            }
            Ok(())
        }
    }

    /// Wraps a transport and deterministically drops or corrupts bytes
    /// written through it, to exercise loss/corruption recovery.
    pub struct FaultyTransport<T: Transport> {
        inner: T,
        written: usize,
        /// Byte offsets (into the stream of bytes written so far) to drop
        /// entirely rather than forward.
        drop_offsets: VecDeque<usize>,
        /// Byte offsets to forward with their value XORed by 0xFF.
        corrupt_offsets: VecDeque<usize>,
    }

    impl<T: Transport> FaultyTransport<T> {
        pub fn new(inner: T) -> Self {
            Self {
                inner,
                written: 0,
                drop_offsets: VecDeque::new(),
                corrupt_offsets: VecDeque::new(),
            }
        }

        pub fn drop_byte_at(mut self, offset: usize) -> Self {
            self.drop_offsets.push_back(offset);
            self
        }

        pub fn corrupt_byte_at(mut self, offset: usize) -> Self {
            self.corrupt_offsets.push_back(offset);
            self
        }
    }

    impl<T: Transport> Transport for FaultyTransport<T> {
        fn read_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
            self.inner.read_byte(timeout)
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            for &byte in bytes {
                let offset = self.written;
                self.written += 1;

                if self.drop_offsets.contains(&offset) {
                    continue;
                }

                let byte = if self.corrupt_offsets.contains(&offset) {
                    byte ^ 0xFF
                } else {
                    byte
                };

                self.inner.write_all(&[byte])?;
            }
            Ok(())
        }

        fn snapshot(&self) -> Config {
            self.inner.snapshot()
        }

        fn restore(&mut self, cfg: Config) -> io::Result<()> {
            self.inner.restore(cfg)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn loopback_pair_delivers_bytes() {
            let (mut a, mut b) = LoopbackTransport::pair();
            a.write_all(&[1, 2, 3]).unwrap();
            assert_eq!(b.read_byte(Duration::from_millis(50)).unwrap(), Some(1));
            assert_eq!(b.read_byte(Duration::from_millis(50)).unwrap(), Some(2));
            assert_eq!(b.read_byte(Duration::from_millis(50)).unwrap(), Some(3));
        }

        #[test]
        fn read_times_out_without_data() {
            let (_a, mut b) = LoopbackTransport::pair();
            assert_eq!(b.read_byte(Duration::from_millis(10)).unwrap(), None);
        }

        #[test]
        fn faulty_transport_drops_selected_byte() {
            let (a, mut b) = LoopbackTransport::pair();
            let mut faulty = FaultyTransport::new(a).drop_byte_at(1);
            faulty.write_all(&[0xAA, 0xBB, 0xCC]).unwrap();
            assert_eq!(b.read_byte(Duration::from_millis(50)).unwrap(), Some(0xAA));
            assert_eq!(b.read_byte(Duration::from_millis(50)).unwrap(), Some(0xCC));
        }

        #[test]
        fn faulty_transport_corrupts_selected_byte() {
            let (a, mut b) = LoopbackTransport::pair();
            let mut faulty = FaultyTransport::new(a).corrupt_byte_at(0);
            faulty.write_all(&[0xAA]).unwrap();
            assert_eq!(b.read_byte(Duration::from_millis(50)).unwrap(), Some(0x55));
        }

        #[test]
        fn transports_with_no_line_configuration_snapshot_and_restore_as_no_ops() {
            let (mut a, _b) = LoopbackTransport::pair();
            let cfg = a.snapshot();
            assert_eq!(cfg, Config::default());
            a.restore(cfg).unwrap();

            let (inner, _b) = LoopbackTransport::pair();
            let mut faulty = FaultyTransport::new(inner);
            assert_eq!(faulty.snapshot(), Config::default());
            faulty.restore(Config::default()).unwrap();
        }
    }
}
