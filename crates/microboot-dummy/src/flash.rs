//! In-memory flash controller
//!
//! Emulates the register-level behavior the engine depends on: busy
//! cycles after every operation, error flags that latch until cleared,
//! lock discipline, cache enable bits and the option-byte mirrors.
//! Control-bit activity is recorded so tests can assert what the engine
//! actually asserted.

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use core::cell::Cell;

use microboot_core::flash::{
    Bank, Banks, CacheState, FlashController, FlashError, RdpLevel, WrpArea,
};

/// Geometry and timing of the emulated flash
#[derive(Debug, Clone)]
pub struct SimFlashConfig {
    /// Base address of main flash
    pub base: u32,
    /// Erase page size in bytes
    pub page_size: u32,
    /// Pages per bank
    pub pages_per_bank: u16,
    /// How many busy polls an operation takes to complete
    pub busy_polls: u32,
}

impl Default for SimFlashConfig {
    fn default() -> Self {
        Self {
            base: 0x0800_0000,
            page_size: 2048,
            pages_per_bank: 128,
            busy_polls: 2,
        }
    }
}

/// In-memory flash controller
///
/// `WORD` is the programming granularity in bytes (8 or 16), `DUAL`
/// whether a second bank exists - the same build-time selection a device
/// support crate makes.
#[cfg(feature = "alloc")]
pub struct SimFlash<const WORD: usize = 8, const DUAL: bool = true> {
    config: SimFlashConfig,
    data: Vec<u8>,
    locked: bool,
    ob_unlocked: bool,
    busy: Cell<u32>,
    errors: FlashError,
    eop: bool,
    caches: CacheState,
    mass_banks: Banks,
    wrp: [(u8, u8); 4],
    rdp: RdpLevel,
    inject: Option<FlashError>,
    stuck_busy: bool,

    /// How often the mass-erase control bits were set
    pub mass_erase_asserts: u32,
    /// Page indices the engine asked to erase, in order
    pub page_erases: Vec<u16>,
    /// Word addresses the engine programmed, in order
    pub programmed: Vec<u32>,
    /// How often the caches were flushed and re-enabled
    pub flush_count: u32,
    /// Operations attempted while the controller was locked
    pub locked_violations: u32,
    /// unlock() invocations
    pub unlock_calls: u32,
    /// lock() invocations
    pub lock_calls: u32,
}

/// Double-word, dual-bank device
#[cfg(feature = "alloc")]
pub type DualBankFlash = SimFlash<8, true>;
/// Double-word, single-bank device
#[cfg(feature = "alloc")]
pub type SingleBankFlash = SimFlash<8, false>;
/// Quad-word, dual-bank device
#[cfg(feature = "alloc")]
pub type QuadWordFlash = SimFlash<16, true>;

#[cfg(feature = "alloc")]
impl<const WORD: usize, const DUAL: bool> SimFlash<WORD, DUAL> {
    /// Create an erased flash with the given geometry
    pub fn new(config: SimFlashConfig) -> Self {
        let banks = if DUAL { 2 } else { 1 };
        let size = config.page_size as usize * config.pages_per_bank as usize * banks;
        Self {
            config,
            data: vec![0xFF; size],
            locked: true,
            ob_unlocked: false,
            busy: Cell::new(0),
            errors: FlashError::empty(),
            eop: false,
            caches: CacheState::ICACHE | CacheState::DCACHE,
            mass_banks: Banks::empty(),
            wrp: [(0x7F, 0x00); 4],
            rdp: RdpLevel::Level0,
            inject: None,
            stuck_busy: false,
            mass_erase_asserts: 0,
            page_erases: Vec::new(),
            programmed: Vec::new(),
            flush_count: 0,
            locked_violations: 0,
            unlock_calls: 0,
            lock_calls: 0,
        }
    }

    /// Create an erased flash with default geometry
    pub fn new_default() -> Self {
        Self::new(SimFlashConfig::default())
    }

    /// Total emulated size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The geometry
    pub fn config(&self) -> &SimFlashConfig {
        &self.config
    }

    /// The raw flash image
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the raw flash image (test setup)
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The write-protection area mirrors, in area order
    pub fn wrp(&self) -> [(u8, u8); 4] {
        self.wrp
    }

    /// Latch the given error flags when the next operation starts
    pub fn fail_next(&mut self, errors: FlashError) {
        self.inject = Some(errors);
    }

    /// Make every following operation stay busy past any timeout
    pub fn stick_busy(&mut self) {
        self.stuck_busy = true;
    }

    /// Base address of a protocol page index
    fn page_offset(&self, page: u16) -> Option<usize> {
        let banks = if DUAL { 2 } else { 1 };
        let total_pages = self.config.pages_per_bank as usize * banks;
        if (page as usize) < total_pages {
            Some(page as usize * self.config.page_size as usize)
        } else {
            None
        }
    }

    /// Begin a hardware operation: arm the busy counter or latch an
    /// injected failure. Returns whether the operation may take effect.
    fn begin_operation(&mut self) -> bool {
        if let Some(errors) = self.inject.take() {
            self.errors |= errors;
            self.busy.set(0);
            return false;
        }
        if self.stuck_busy {
            self.busy.set(u32::MAX);
        } else {
            self.busy.set(self.config.busy_polls);
        }
        self.eop = true;
        true
    }

    fn bank_range(&self, bank: Banks) -> core::ops::Range<usize> {
        let bank_size = self.config.page_size as usize * self.config.pages_per_bank as usize;
        if bank == Banks::BANK_1 {
            0..bank_size
        } else if bank == Banks::BANK_2 {
            bank_size..bank_size * 2
        } else {
            0..0
        }
    }
}

#[cfg(feature = "alloc")]
impl<const WORD: usize, const DUAL: bool> FlashController for SimFlash<WORD, DUAL> {
    const WORD_SIZE: usize = WORD;
    const DUAL_BANK: bool = DUAL;

    fn unlock(&mut self) {
        self.unlock_calls += 1;
        self.locked = false;
    }

    fn lock(&mut self) {
        self.lock_calls += 1;
        self.locked = true;
        self.ob_unlocked = false;
    }

    fn unlock_option_bytes(&mut self) {
        self.locked = false;
        self.ob_unlocked = true;
    }

    fn is_busy(&self) -> bool {
        let remaining = self.busy.get();
        if remaining == 0 {
            return false;
        }
        if remaining != u32::MAX {
            self.busy.set(remaining - 1);
        }
        true
    }

    fn errors(&self) -> FlashError {
        self.errors
    }

    fn clear_errors(&mut self, errors: FlashError) {
        self.errors.remove(errors);
    }

    fn end_of_operation(&self) -> bool {
        self.eop
    }

    fn clear_end_of_operation(&mut self) {
        self.eop = false;
    }

    fn enabled_caches(&self) -> CacheState {
        self.caches
    }

    fn disable_caches(&mut self, caches: CacheState) {
        self.caches.remove(caches);
    }

    fn flush_and_enable_caches(&mut self, caches: CacheState) {
        self.flush_count += 1;
        self.caches.insert(caches);
    }

    fn set_mass_erase(&mut self, banks: Banks) {
        self.mass_banks = banks;
        self.mass_erase_asserts += 1;
    }

    fn clear_mass_erase(&mut self, banks: Banks) {
        self.mass_banks.remove(banks);
    }

    fn start(&mut self) {
        if self.locked {
            self.locked_violations += 1;
            self.errors |= FlashError::PROG;
            return;
        }

        if !self.mass_banks.is_empty() {
            let banks = self.mass_banks;
            if self.begin_operation() {
                for bank in [Banks::BANK_1, Banks::BANK_2] {
                    if banks.contains(bank) {
                        let range = self.bank_range(bank);
                        self.data[range].fill(0xFF);
                    }
                }
            }
        }
    }

    fn erase_page(&mut self, _bank: Bank, page: u16) {
        self.page_erases.push(page);

        if self.locked {
            self.locked_violations += 1;
            self.errors |= FlashError::PROG;
            return;
        }

        let Some(offset) = self.page_offset(page) else {
            self.errors |= FlashError::PGA;
            return;
        };

        if self.begin_operation() {
            let page_size = self.config.page_size as usize;
            self.data[offset..offset + page_size].fill(0xFF);
        }
    }

    fn clear_page_erase(&mut self) {}

    fn program_word(&mut self, address: u32, word: &[u8]) {
        debug_assert_eq!(word.len(), WORD);

        if self.locked {
            self.locked_violations += 1;
            self.errors |= FlashError::PROG;
            return;
        }

        let offset = (address - self.config.base) as usize;
        if offset + WORD > self.data.len() {
            self.errors |= FlashError::PGA;
            return;
        }

        if self.begin_operation() {
            self.programmed.push(address);
            // Programming can only clear bits (1 -> 0)
            for (index, byte) in word.iter().enumerate() {
                self.data[offset + index] &= byte;
            }
        }
    }

    fn read_byte(&self, address: u32) -> u8 {
        let offset = address.wrapping_sub(self.config.base) as usize;
        self.data.get(offset).copied().unwrap_or(0xFF)
    }

    fn read_protection_level(&self) -> RdpLevel {
        self.rdp
    }

    fn program_read_protection(&mut self, level: RdpLevel) {
        if !self.ob_unlocked {
            self.locked_violations += 1;
            self.errors |= FlashError::OPTV;
            return;
        }
        if self.begin_operation() {
            self.rdp = level;
        }
    }

    fn program_write_protection(&mut self, area: WrpArea, start: u8, end: u8) {
        if !self.ob_unlocked {
            self.locked_violations += 1;
            self.errors |= FlashError::OPTV;
            return;
        }
        if self.begin_operation() {
            let index = match area {
                WrpArea::Bank1AreaA => 0,
                WrpArea::Bank1AreaB => 1,
                WrpArea::Bank2AreaA => 2,
                WrpArea::Bank2AreaB => 3,
            };
            self.wrp[index] = (start, end);
        }
    }
}
