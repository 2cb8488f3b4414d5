//! Flash engine
//!
//! Everything that mutates internal non-volatile memory: the unlock/lock
//! discipline, mass and page erase, word-granular programming, the
//! write/readout protection configuration, and the jump to the
//! application image. The register-level peripheral stays behind the
//! [`FlashController`] capability trait; this module owns the operation
//! sequencing and the single shared process state.

mod controller;
mod engine;
mod region;
mod wait;

pub use controller::{
    Bank, Banks, BusySink, CacheState, FlashController, FlashError, RdpLevel, SystemControl,
    WrpArea,
};
pub use engine::{FlashEngine, FlashProcess, Procedure};
pub use region::FlashRegion;

/// Tick budget for a single program or pre-operation drain
pub const PROGRAM_TIMEOUT: u32 = 50_000;
/// Tick budget for an erase operation
pub const ERASE_TIMEOUT: u32 = 200_000;

/// Value of an erased flash byte - the correct no-op fill for
/// unprogrammed trailing bytes
pub const ERASED_BYTE: u8 = 0xFF;

/// Largest supported programming word (quad-word devices)
pub const MAX_WORD_SIZE: usize = 16;

/// Highest page index that maps to bank 1
pub const BANK1_LAST_PAGE: u16 = 127;
/// Highest page index that maps to bank 2 on dual-bank devices
pub const BANK2_LAST_PAGE: u16 = 255;
