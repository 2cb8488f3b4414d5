//! Transport capability trait
//!
//! The byte-level drivers live outside this crate; the core only sees the
//! capability set below. Optional capabilities are trait methods with
//! default bodies - a transport that does not override them behaves like a
//! driver that left the corresponding slot empty (the watchdog registrant
//! overrides nothing beyond configuration, a host-detect-only transport
//! overrides just detection).

use crate::flash::BusySink;
use crate::protocol;

/// Physical transport classes a host may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Asynchronous serial
    Uart,
    /// I2C target
    I2c,
    /// SPI target
    Spi,
    /// CAN / CAN-FD
    Can,
    /// USB device (detection only, commands flow through a separate stack)
    Usb,
    /// Watchdog-refresh registrant, never carries host traffic
    WatchdogOnly,
}

impl TransportKind {
    /// Short human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uart => "UART",
            Self::I2c => "I2C",
            Self::Spi => "SPI",
            Self::Can => "CAN",
            Self::Usb => "USB",
            Self::WatchdogOnly => "IWDG",
        }
    }
}

/// Capability interface implemented by each transport driver
///
/// `configure` and `detect_activity` are mandatory; everything else is
/// optional and defaults to the no-capability behavior.
pub trait Transport {
    /// Which physical transport this adapter drives
    fn kind(&self) -> TransportKind;

    /// Bring the peripheral up for protocol detection
    fn configure(&mut self);

    /// Return the peripheral to its reset state
    fn deinit(&mut self) {}

    /// Poll once for host activity on this transport
    fn detect_activity(&mut self) -> bool;

    /// Pull the next command opcode from the host
    ///
    /// Returns `None` when the transport has no command channel, or no
    /// opcode is pending this tick; the dispatcher treats both as a no-op.
    fn get_opcode(&mut self) -> Option<u8> {
        None
    }

    /// Push one protocol byte to the host
    ///
    /// Transports without a reply channel keep the default and silently
    /// drop the byte.
    fn send_byte(&mut self, byte: u8) {
        let _ = byte;
    }
}

/// Adapter exposing a transport's reply channel as a [`BusySink`]
///
/// Lets the flash engine stream busy-indicator bytes through whichever
/// transport is locked, without the engine knowing about transports.
pub struct TransportSink<'a>(pub &'a mut dyn Transport);

impl BusySink for TransportSink<'_> {
    fn send_busy(&mut self) {
        self.0.send_byte(protocol::BUSY);
    }
}
