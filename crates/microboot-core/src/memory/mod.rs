//! Memory area descriptors and the area registry
//!
//! Each addressable region the bootloader serves (flash, RAM, option
//! bytes, OTP, ICP areas) registers one descriptor with its operation
//! set. Generic command handlers route a host-supplied address through
//! the registry into the owning region's implementation.

use core::convert::Infallible;

use heapless::Vec;

use crate::error::{Error, Result};
use crate::flash::{BusySink, RdpLevel, SystemControl};

/// Default number of memory area slots compiled into a firmware image
pub const MEMORY_AREAS_SUPPORTED: usize = 8;

/// What an addressable region holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaKind {
    /// Main flash
    Flash,
    /// SRAM
    Ram,
    /// Option bytes
    OptionBytes,
    /// One-time programmable area
    Otp,
    /// In-circuit programming area
    Icp,
}

/// Static description of one addressable region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDescriptor {
    /// First valid address
    pub start: u32,
    /// Last valid address
    pub end: u32,
    /// Usable size in bytes (may be smaller than the address span on
    /// devices that reserve part of the region)
    pub size: u32,
    /// What the region holds
    pub area: AreaKind,
}

impl MemoryDescriptor {
    /// Describe a region; `start` must not exceed `end`
    pub const fn new(start: u32, end: u32, size: u32, area: AreaKind) -> Self {
        assert!(start <= end);
        Self {
            start,
            end,
            size,
            area,
        }
    }

    /// Whether `address` falls inside this region
    pub const fn contains(&self, address: u32) -> bool {
        self.start <= address && address <= self.end
    }
}

/// Operation set of one memory region
///
/// Only `descriptor` and `read` are universal; the rest default to
/// [`Error::OperationNotSupported`], the analogue of a descriptor slot a
/// region leaves empty (RAM has no erase, only flash can jump).
pub trait MemoryRegion {
    /// This region's address bounds and kind
    fn descriptor(&self) -> MemoryDescriptor;

    /// Read one byte
    fn read(&mut self, address: u32) -> u8;

    /// Write `data` starting at `address`
    fn write(&mut self, _address: u32, _data: &[u8]) -> Result<()> {
        Err(Error::OperationNotSupported)
    }

    /// Erase according to a host erase payload
    fn erase(&mut self, _payload: &[u8], _sink: &mut dyn BusySink) -> Result<()> {
        Err(Error::OperationNotSupported)
    }

    /// Change the readout protection level
    fn set_read_protection(&mut self, _level: RdpLevel) -> Result<()> {
        Err(Error::OperationNotSupported)
    }

    /// Enable or disable write protection from a host payload
    fn set_write_protection(&mut self, _enable: bool, _payload: &[u8]) -> Result<()> {
        Err(Error::OperationNotSupported)
    }

    /// Transfer control to an application inside this region
    ///
    /// Success does not return; regions without the capability report
    /// [`Error::OperationNotSupported`].
    fn jump(&mut self, _system: &mut dyn SystemControl, _address: u32) -> Result<Infallible> {
        Err(Error::OperationNotSupported)
    }
}

/// Fixed-capacity collection of registered memory regions
pub struct MemoryRegistry<'m, const N: usize = MEMORY_AREAS_SUPPORTED> {
    areas: Vec<&'m mut dyn MemoryRegion, N>,
}

impl<'m, const N: usize> MemoryRegistry<'m, N> {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self { areas: Vec::new() }
    }

    /// Append a region to the registry
    pub fn register(&mut self, region: &'m mut dyn MemoryRegion) -> Result<()> {
        let descriptor = region.descriptor();
        self.areas.push(region).map_err(|_| Error::RegistryFull)?;
        log::debug!(
            "registered {:?} area {:#010x}..={:#010x}",
            descriptor.area,
            descriptor.start,
            descriptor.end
        );
        Ok(())
    }

    /// Number of registered regions
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Whether no region has been registered
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// The region owning `address`, if any
    pub fn find(&mut self, address: u32) -> Option<&mut (dyn MemoryRegion + 'm)> {
        self.areas
            .iter_mut()
            .find(|region| region.descriptor().contains(address))
            .map(|region| &mut **region)
    }

    /// The kind of area `address` falls into, if any
    pub fn area_of(&self, address: u32) -> Option<AreaKind> {
        self.areas
            .iter()
            .map(|region| region.descriptor())
            .find(|descriptor| descriptor.contains(address))
            .map(|descriptor| descriptor.area)
    }

    /// Read one byte through the owning region
    pub fn read(&mut self, address: u32) -> Result<u8> {
        let region = self.find(address).ok_or(Error::AddressOutOfBounds)?;
        Ok(region.read(address))
    }

    /// Write through the owning region
    ///
    /// The whole range must fall inside one region.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let end = address
            .checked_add(data.len().saturating_sub(1) as u32)
            .ok_or(Error::AddressOutOfBounds)?;
        let region = self.find(address).ok_or(Error::AddressOutOfBounds)?;
        if !region.descriptor().contains(end) {
            return Err(Error::AddressOutOfBounds);
        }
        region.write(address, data)
    }
}

impl<'m, const N: usize> Default for MemoryRegistry<'m, N> {
    fn default() -> Self {
        Self::new()
    }
}
