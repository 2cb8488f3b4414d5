//! microboot-core - Core library for an in-chip firmware-update bootloader
//!
//! This crate implements the device-resident half of a firmware-update
//! protocol: it arbitrates between the physical transports a host may use
//! (UART, I2C, SPI, CAN, ...), dispatches protocol opcodes to per-transport
//! command tables, and drives the internal flash controller through erase,
//! program, protection and jump-to-application operations. It is `no_std`
//! and allocation-free so it can run before any application is present.
//!
//! The hardware itself stays out of this crate: transports, the flash
//! controller peripheral and the final control hand-off are reached through
//! the [`interface::Transport`], [`flash::FlashController`] and
//! [`flash::SystemControl`] capability traits, which a device support crate
//! (or the `microboot-dummy` emulator) implements.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable heap allocation (device profile handling)
//!
//! # Example
//!
//! ```ignore
//! use microboot_core::interface::{Dispatcher, Interface, InterfaceRegistry};
//!
//! let mut registry = InterfaceRegistry::new();
//! registry.register(Interface::new(&mut uart, uart_commands))?;
//! registry.register(Interface::new(&mut i2c, i2c_commands))?;
//! registry.configure_all();
//!
//! let mut dispatcher = Dispatcher::new();
//! loop {
//!     dispatcher.poll(&mut registry, &mut ctx);
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod error;
pub mod flash;
pub mod interface;
pub mod memory;
pub mod protocol;
#[cfg(feature = "alloc")]
pub mod profile;

pub use error::{Error, Result};
