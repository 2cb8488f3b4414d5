//! Host transport stand-ins
//!
//! [`ScriptedTransport`] replays a canned opcode sequence and records
//! everything the bootloader sends back - the workhorse of the test
//! suite. [`SerialTransport`] adapts any `embedded-io` byte stream into a
//! [`Transport`], which is how a real UART driver would plug in.

#[cfg(feature = "alloc")]
use alloc::collections::VecDeque;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use embedded_io::{Read, ReadReady, Write};

use microboot_core::flash::BusySink;
use microboot_core::interface::{Transport, TransportKind};
use microboot_core::protocol;

/// Transport replaying a canned opcode script
#[cfg(feature = "alloc")]
pub struct ScriptedTransport {
    kind: TransportKind,
    active: bool,
    script: VecDeque<u8>,

    /// Every byte the bootloader sent to the host, in order
    pub sent: Vec<u8>,
    /// How often activity was polled
    pub detect_polls: u32,
    /// Whether configure() ran
    pub configured: bool,
    /// Whether deinit() ran
    pub deinitialized: bool,
}

#[cfg(feature = "alloc")]
impl ScriptedTransport {
    /// A transport of the given kind; `active` controls whether it wins
    /// detection
    pub fn new(kind: TransportKind, active: bool) -> Self {
        Self {
            kind,
            active,
            script: VecDeque::new(),
            sent: Vec::new(),
            detect_polls: 0,
            configured: false,
            deinitialized: false,
        }
    }

    /// Queue opcode bytes for the dispatcher to pull
    pub fn feed(&mut self, bytes: &[u8]) {
        self.script.extend(bytes.iter().copied());
    }

    /// Flip the activity flag
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

#[cfg(feature = "alloc")]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn configure(&mut self) {
        self.configured = true;
    }

    fn deinit(&mut self) {
        self.deinitialized = true;
    }

    fn detect_activity(&mut self) -> bool {
        self.detect_polls += 1;
        self.active
    }

    fn get_opcode(&mut self) -> Option<u8> {
        self.script.pop_front()
    }

    fn send_byte(&mut self, byte: u8) {
        self.sent.push(byte);
    }
}

#[cfg(feature = "alloc")]
impl BusySink for ScriptedTransport {
    fn send_busy(&mut self) {
        self.sent.push(protocol::BUSY);
    }
}

/// Transport over any `embedded-io` byte stream
///
/// Detection reports activity as soon as the host has sent anything;
/// opcode reads are non-blocking so an idle host never stalls the
/// dispatcher tick.
pub struct SerialTransport<T> {
    io: T,
    kind: TransportKind,
}

impl<T> SerialTransport<T>
where
    T: Read + Write + ReadReady,
{
    /// Wrap a byte stream as a transport of the given kind
    pub fn new(kind: TransportKind, io: T) -> Self {
        Self { io, kind }
    }

    /// The underlying stream
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T> Transport for SerialTransport<T>
where
    T: Read + Write + ReadReady,
{
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn configure(&mut self) {}

    fn detect_activity(&mut self) -> bool {
        self.io.read_ready().unwrap_or(false)
    }

    fn get_opcode(&mut self) -> Option<u8> {
        if !self.io.read_ready().unwrap_or(false) {
            return None;
        }
        let mut byte = [0u8; 1];
        match self.io.read(&mut byte) {
            Ok(n) if n >= 1 => Some(byte[0]),
            _ => None,
        }
    }

    fn send_byte(&mut self, byte: u8) {
        if self.io.write_all(&[byte]).is_err() {
            log::warn!("{}: host reply dropped", self.kind.name());
        }
    }
}

impl<T> BusySink for SerialTransport<T>
where
    T: Read + Write + ReadReady,
{
    fn send_busy(&mut self) {
        self.send_byte(protocol::BUSY);
    }
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;
    use core::convert::Infallible;

    /// Minimal in-memory byte stream for exercising the serial adapter
    struct Loopback {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl embedded_io::ErrorType for Loopback {
        type Error = Infallible;
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            let mut count = 0;
            for slot in buf.iter_mut() {
                match self.rx.pop_front() {
                    Some(byte) => {
                        *slot = byte;
                        count += 1;
                    }
                    None => break,
                }
            }
            Ok(count)
        }
    }

    impl ReadReady for Loopback {
        fn read_ready(&mut self) -> Result<bool, Infallible> {
            Ok(!self.rx.is_empty())
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    #[test]
    fn scripted_replays_and_records() {
        let mut transport = ScriptedTransport::new(TransportKind::Uart, true);
        transport.feed(&[0x01, 0x02]);

        assert_eq!(transport.get_opcode(), Some(0x01));
        assert_eq!(transport.get_opcode(), Some(0x02));
        assert_eq!(transport.get_opcode(), None);

        transport.send_byte(protocol::ACK);
        assert_eq!(transport.sent, [protocol::ACK]);
    }

    #[test]
    fn serial_detects_pending_bytes() {
        let io = Loopback {
            rx: VecDeque::from([0x11]),
            tx: Vec::new(),
        };
        let mut transport = SerialTransport::new(TransportKind::Uart, io);

        assert!(transport.detect_activity());
        assert_eq!(transport.get_opcode(), Some(0x11));
        assert!(!transport.detect_activity());
        assert_eq!(transport.get_opcode(), None);

        transport.send_byte(protocol::NACK);
        assert_eq!(transport.into_inner().tx, [protocol::NACK]);
    }
}
