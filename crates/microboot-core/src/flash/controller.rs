//! Capability traits for the flash controller peripheral and the platform
//!
//! The engine never touches numeric registers; a device support crate
//! implements [`FlashController`] over the real peripheral and
//! [`SystemControl`] over the reset/interrupt machinery. The
//! `microboot-dummy` crate implements both in memory.

use bitflags::bitflags;

bitflags! {
    /// Hardware error flags of the flash status register
    ///
    /// Bit positions follow the status-register layout of the supported
    /// device families; the engine only ever treats them as an opaque
    /// mask to latch, report and clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlashError: u32 {
        /// Operation error
        const OP = 1 << 1;
        /// Programming error
        const PROG = 1 << 3;
        /// Write-protection violation
        const WRP = 1 << 4;
        /// Programming alignment error
        const PGA = 1 << 5;
        /// Size error
        const SIZ = 1 << 6;
        /// Programming sequence error
        const PGS = 1 << 7;
        /// Fast-programming data miss
        const MIS = 1 << 8;
        /// Fast-programming error
        const FAST = 1 << 9;
        /// Readout-protection read error
        const RD = 1 << 14;
        /// Option-byte validity error
        const OPTV = 1 << 15;
        /// Security violation (profiles with a secure/non-secure split)
        const SECV = 1 << 24;
    }
}

bitflags! {
    /// Which CPU caches are enabled
    ///
    /// Recorded before an erase so the same set can be flushed and
    /// re-enabled afterwards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheState: u8 {
        /// Instruction cache
        const ICACHE = 1 << 0;
        /// Data cache
        const DCACHE = 1 << 1;
    }
}

bitflags! {
    /// Flash bank mask for mass erase
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Banks: u8 {
        /// First bank
        const BANK_1 = 1 << 0;
        /// Second bank (dual-bank devices)
        const BANK_2 = 1 << 1;
    }
}

/// A single flash bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    /// First bank
    Bank1,
    /// Second bank (dual-bank devices)
    Bank2,
}

/// Readout protection levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdpLevel {
    /// No protection
    Level0,
    /// External read access to flash is blocked
    Level1,
    /// Full chip protection; permanent, there is no way back
    Level2,
}

impl RdpLevel {
    /// Decode the RDP option byte
    ///
    /// Anything that is neither the level-0 nor the level-2 magic value
    /// reads as level 1, matching the hardware.
    pub fn from_option_byte(byte: u8) -> Self {
        match byte {
            0xAA => Self::Level0,
            0xCC => Self::Level2,
            _ => Self::Level1,
        }
    }

    /// The option-byte value programming this level
    pub const fn option_byte(self) -> u8 {
        match self {
            Self::Level0 => 0xAA,
            Self::Level1 => 0xBB,
            Self::Level2 => 0xCC,
        }
    }
}

/// The four named write-protection areas, two per bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrpArea {
    /// Bank 1, area A
    Bank1AreaA,
    /// Bank 1, area B
    Bank1AreaB,
    /// Bank 2, area A (dual-bank devices)
    Bank2AreaA,
    /// Bank 2, area B (dual-bank devices)
    Bank2AreaB,
}

/// Register-level capability interface to the flash controller
///
/// Implementations model the hardware, not policy: `unlock`/`lock` follow
/// the control register's write-once-then-latch semantics and are legal to
/// call redundantly, `erase_page`/`start` merely set control bits, and
/// completion is observed through `is_busy`/`errors`/`end_of_operation`.
/// All sequencing lives in [`super::FlashEngine`].
pub trait FlashController {
    /// Minimum programmable unit in bytes: 8 on double-word families,
    /// 16 on quad-word families
    const WORD_SIZE: usize;

    /// Whether the device has a second flash bank
    const DUAL_BANK: bool;

    /// Enable flash control register access
    fn unlock(&mut self);

    /// Latch flash control register access off
    fn lock(&mut self);

    /// Enable option-byte register access (implies control register
    /// unlock)
    fn unlock_option_bytes(&mut self);

    /// Whether a flash operation is in progress
    fn is_busy(&self) -> bool;

    /// Currently latched hardware error flags, including the security
    /// violation flag on secure profiles
    fn errors(&self) -> FlashError;

    /// Clear the given hardware error flags
    fn clear_errors(&mut self, errors: FlashError);

    /// Whether the end-of-operation flag is set
    fn end_of_operation(&self) -> bool;

    /// Clear the end-of-operation flag
    fn clear_end_of_operation(&mut self);

    /// Which caches are currently enabled
    fn enabled_caches(&self) -> CacheState;

    /// Disable the given caches
    fn disable_caches(&mut self, caches: CacheState);

    /// Flush the given caches and re-enable them
    fn flush_and_enable_caches(&mut self, caches: CacheState);

    /// Set the mass-erase control bits for the given banks
    fn set_mass_erase(&mut self, banks: Banks);

    /// Clear the mass-erase control bits for the given banks
    fn clear_mass_erase(&mut self, banks: Banks);

    /// Assert the start bit, launching the configured erase
    fn start(&mut self);

    /// Program the page-erase control bits for `page` in `bank` and
    /// assert start
    fn erase_page(&mut self, bank: Bank, page: u16);

    /// Clear the page-erase control bits
    fn clear_page_erase(&mut self);

    /// Program one word at `address`; `word.len()` equals
    /// [`Self::WORD_SIZE`]
    fn program_word(&mut self, address: u32, word: &[u8]);

    /// Read one byte from the memory bus
    fn read_byte(&self, address: u32) -> u8;

    /// Current readout protection level from the option bytes
    fn read_protection_level(&self) -> RdpLevel;

    /// Program the RDP option byte
    fn program_read_protection(&mut self, level: RdpLevel);

    /// Program one write-protection area's start/end offsets
    fn program_write_protection(&mut self, area: WrpArea, start: u8, end: u8);
}

/// Sink for busy-indicator bytes streamed to the host during a long flash
/// operation
///
/// Needed by transports without native wait-state signaling (I2C without
/// clock stretching). The unit type is a sink that drops the bytes.
pub trait BusySink {
    /// Emit one busy indication to the host
    fn send_busy(&mut self);
}

impl BusySink for () {
    fn send_busy(&mut self) {}
}

/// Platform hand-off capabilities used by jump-to-application
pub trait SystemControl {
    /// Return every peripheral the bootloader touched to its reset state
    fn deinit(&mut self);

    /// Re-enable interrupts ahead of the application hand-off
    fn enable_interrupts(&mut self);

    /// Load the main stack pointer and transfer control to the entry
    /// point; never returns
    fn bootstrap(&mut self, stack_pointer: u32, entry_point: u32) -> !;
}
