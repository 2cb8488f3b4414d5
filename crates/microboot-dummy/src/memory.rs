//! RAM area stand-in

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use microboot_core::error::{Error, Result};
use microboot_core::memory::{AreaKind, MemoryDescriptor, MemoryRegion};

/// A RAM region backed by a heap buffer
///
/// Supports read and write; erase, protection and jump keep the
/// unsupported defaults, exactly like a RAM descriptor with those slots
/// left empty.
#[cfg(feature = "alloc")]
pub struct RamArea {
    base: u32,
    data: Vec<u8>,
}

#[cfg(feature = "alloc")]
impl RamArea {
    /// A zero-filled RAM area
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    /// The raw contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(feature = "alloc")]
impl MemoryRegion for RamArea {
    fn descriptor(&self) -> MemoryDescriptor {
        MemoryDescriptor::new(
            self.base,
            self.base + self.data.len() as u32 - 1,
            self.data.len() as u32,
            AreaKind::Ram,
        )
    }

    fn read(&mut self, address: u32) -> u8 {
        let offset = address.wrapping_sub(self.base) as usize;
        self.data.get(offset).copied().unwrap_or(0)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let offset = address.wrapping_sub(self.base) as usize;
        let end = offset.checked_add(data.len()).ok_or(Error::AddressOutOfBounds)?;
        if end > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip() {
        let mut ram = RamArea::new(0x2000_0000, 64);
        ram.write(0x2000_0010, &[1, 2, 3]).unwrap();
        assert_eq!(ram.read(0x2000_0011), 2);
    }

    #[test]
    fn write_outside_bounds_is_rejected() {
        let mut ram = RamArea::new(0x2000_0000, 16);
        assert_eq!(
            ram.write(0x2000_000E, &[0; 4]),
            Err(Error::AddressOutOfBounds)
        );
    }

    #[test]
    fn ram_has_no_erase() {
        let mut ram = RamArea::new(0x2000_0000, 16);
        assert_eq!(
            ram.erase(&[0x01, 0x00], &mut ()),
            Err(Error::OperationNotSupported)
        );
    }
}
