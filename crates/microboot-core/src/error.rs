//! Error types for microboot-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
///
/// This is the coarse, caller-facing taxonomy. Hardware-reported error
/// bits are additionally latched into the flash process error bitmask
/// (see [`crate::flash::FlashEngine::error_code`]) for later inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Registry errors
    /// Interface or memory registry is at its build-time capacity
    RegistryFull,

    // Host payload errors
    /// Payload is shorter than the operation's fixed header
    PayloadTooShort,
    /// Mass-erase selector is not one of the recognized bank selectors
    InvalidBankSelector,

    // Flash engine errors
    /// Flash process lock is already held (re-entrant acquisition)
    Busy,
    /// Busy-wait tick budget exhausted before the operation completed
    Timeout,
    /// Flash controller reported program/erase error flags
    HardwareFault,
    /// One or more pages of an erase batch failed
    EraseFailed,

    // Protection errors
    /// Requested protection change is refused by policy (permanent level)
    ProtectionRefused,

    // Memory descriptor errors
    /// The operation is not applicable to this memory area
    OperationNotSupported,
    /// Address does not fall inside any registered memory area
    AddressOutOfBounds,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistryFull => write!(f, "registry capacity exceeded"),
            Self::PayloadTooShort => write!(f, "payload too short"),
            Self::InvalidBankSelector => write!(f, "invalid mass-erase bank selector"),
            Self::Busy => write!(f, "flash process already in progress"),
            Self::Timeout => write!(f, "flash operation timed out"),
            Self::HardwareFault => write!(f, "flash controller reported an error"),
            Self::EraseFailed => write!(f, "one or more pages failed to erase"),
            Self::ProtectionRefused => write!(f, "protection level refused by policy"),
            Self::OperationNotSupported => write!(f, "operation not supported by this memory area"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
