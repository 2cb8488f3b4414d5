//! Device profiles
//!
//! A profile records the device identity and flash geometry a bootloader
//! image is configured for. On target this is baked in at build time;
//! host-side tooling loads it from TOML.

use alloc::string::String;

use crate::flash::Bank;
use crate::memory::{AreaKind, MemoryDescriptor};

/// Flash geometry of a device family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashGeometry {
    /// Base address of main flash
    pub base: u32,
    /// Total flash size in bytes
    pub size: u32,
    /// Erase page size in bytes
    pub page_size: u32,
    /// Whether the device has a second bank
    pub dual_bank: bool,
    /// Minimum programmable unit in bytes (8 or 16)
    pub word_size: u32,
}

impl FlashGeometry {
    /// Last valid flash address
    pub const fn end(&self) -> u32 {
        self.base + self.size - 1
    }

    /// Number of erase pages
    pub const fn page_count(&self) -> u32 {
        self.size / self.page_size
    }

    /// Base address of an erase page
    pub const fn page_address(&self, page: u16) -> u32 {
        self.base + page as u32 * self.page_size
    }

    /// Which bank a page index falls into, given this geometry
    pub fn bank_of_page(&self, page: u16) -> Option<Bank> {
        let per_bank = if self.dual_bank {
            self.page_count() / 2
        } else {
            self.page_count()
        };
        if (page as u32) < per_bank {
            Some(Bank::Bank1)
        } else if self.dual_bank && (page as u32) < per_bank * 2 {
            Some(Bank::Bank2)
        } else {
            None
        }
    }

    /// The flash area descriptor for this geometry
    pub const fn descriptor(&self) -> MemoryDescriptor {
        MemoryDescriptor::new(self.base, self.end(), self.size, AreaKind::Flash)
    }
}

/// Identity and geometry of the device a bootloader image serves
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceProfile {
    /// Marketing name of the device family
    pub name: String,
    /// Product identifier reported by GET_ID
    pub product_id: u16,
    /// Protocol version reported by GET_VERSION
    pub version: u8,
    /// Main flash geometry
    pub flash: FlashGeometry,
    /// RAM base address
    pub ram_base: u32,
    /// RAM size in bytes
    pub ram_size: u32,
}

impl DeviceProfile {
    /// The RAM area descriptor
    pub const fn ram_descriptor(&self) -> MemoryDescriptor {
        MemoryDescriptor::new(
            self.ram_base,
            self.ram_base + self.ram_size - 1,
            self.ram_size,
            AreaKind::Ram,
        )
    }

    /// Parse a profile from TOML
    #[cfg(feature = "std")]
    pub fn from_toml_str(input: &str) -> core::result::Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Serialize a profile to TOML
    #[cfg(feature = "std")]
    pub fn to_toml_string(&self) -> core::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for DeviceProfile {
    /// A 512 KiB dual-bank, double-word device (128 pages of 2 KiB per
    /// bank) - the geometry the dummy peripherals emulate
    fn default() -> Self {
        Self {
            name: String::from("generic-g0"),
            product_id: 0x0467,
            version: 0x31,
            flash: FlashGeometry {
                base: 0x0800_0000,
                size: 512 * 1024,
                page_size: 2048,
                dual_bank: true,
                word_size: 8,
            },
            ram_base: 0x2000_0000,
            ram_size: 128 * 1024,
        }
    }
}
