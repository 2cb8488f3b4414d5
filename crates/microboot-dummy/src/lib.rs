//! microboot-dummy - In-memory peripherals for testing the bootloader core
//!
//! This crate emulates the out-of-scope hardware collaborators of
//! `microboot-core` in plain memory: the flash controller peripheral, the
//! host transports, a RAM area and the platform hand-off. It is what the
//! test suite and the host-side simulator run the bootloader against, so
//! no real hardware is needed for development.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

mod flash;
mod memory;
mod system;
mod transport;

pub use flash::SimFlashConfig;
#[cfg(feature = "alloc")]
pub use flash::{DualBankFlash, QuadWordFlash, SimFlash, SingleBankFlash};
#[cfg(feature = "alloc")]
pub use memory::RamArea;
pub use system::RecordingSystem;
#[cfg(feature = "alloc")]
pub use transport::ScriptedTransport;
pub use transport::SerialTransport;
