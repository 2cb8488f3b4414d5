//! The flash memory area descriptor
//!
//! Binds a [`FlashEngine`] and its address bounds into a
//! [`MemoryRegion`], so generic read/write/erase command handlers can
//! route host-supplied addresses into the flash implementation.

use core::convert::Infallible;

use super::controller::{BusySink, FlashController, RdpLevel, SystemControl};
use super::engine::FlashEngine;
use crate::error::Result;
use crate::memory::{AreaKind, MemoryDescriptor, MemoryRegion};
use crate::protocol::wire;

/// The internal-flash memory area
pub struct FlashRegion<C: FlashController> {
    descriptor: MemoryDescriptor,
    engine: FlashEngine<C>,
}

impl<C: FlashController> FlashRegion<C> {
    /// Describe a flash area served by `engine`
    pub fn new(start: u32, end: u32, size: u32, engine: FlashEngine<C>) -> Self {
        Self {
            descriptor: MemoryDescriptor::new(start, end, size, AreaKind::Flash),
            engine,
        }
    }

    /// Borrow the engine
    pub fn engine(&self) -> &FlashEngine<C> {
        &self.engine
    }

    /// Mutably borrow the engine
    pub fn engine_mut(&mut self) -> &mut FlashEngine<C> {
        &mut self.engine
    }
}

impl<C: FlashController> MemoryRegion for FlashRegion<C> {
    fn descriptor(&self) -> MemoryDescriptor {
        self.descriptor
    }

    fn read(&mut self, address: u32) -> u8 {
        self.engine.read(address)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.engine.write(address, data)
    }

    fn erase(&mut self, payload: &[u8], sink: &mut dyn BusySink) -> Result<()> {
        // A selector at or above the bank-2 selector is one of the mass
        // erase requests; anything below is a page count.
        match wire::read_u16_le(payload) {
            Some(selector) if selector >= wire::MASS_ERASE_BANK2 => {
                self.engine.mass_erase(payload, sink)
            }
            _ => self.engine.erase_pages(payload, sink),
        }
    }

    fn set_read_protection(&mut self, level: RdpLevel) -> Result<()> {
        self.engine.set_read_protection(level)
    }

    fn set_write_protection(&mut self, enable: bool, payload: &[u8]) -> Result<()> {
        self.engine.set_write_protection(enable, payload)
    }

    fn jump(&mut self, system: &mut dyn SystemControl, address: u32) -> Result<Infallible> {
        self.engine.jump(system, address)
    }
}
