//! The flash engine: operation sequencing over the controller capability
//!
//! All entry points follow the same discipline: host payloads are
//! validated before any register is touched, the control registers are
//! unlocked on entry and locked again on every exit path, and anything
//! that starts the controller waits for completion through the primitives
//! in [`super::wait`].

use super::controller::{
    Bank, Banks, BusySink, CacheState, FlashController, FlashError, RdpLevel, SystemControl,
    WrpArea,
};
use super::wait::{self, HwStatus};
use super::{
    BANK1_LAST_PAGE, BANK2_LAST_PAGE, ERASED_BYTE, ERASE_TIMEOUT, MAX_WORD_SIZE, PROGRAM_TIMEOUT,
};
use crate::error::{Error, Result};
use crate::protocol::wire;

/// Which flash procedure is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Procedure {
    /// Idle
    #[default]
    None,
    /// Mass or page erase
    Erase,
    /// Word programming
    Program,
    /// Option-byte programming
    OptionByte,
}

/// Shared state of the single flash controller
///
/// There is exactly one of these per device; mutation happens only while
/// the process lock is held. The lock is a fail-fast flag, not a blocking
/// primitive: in the single-threaded super-loop a second acquisition can
/// only mean a programming error, so it reports [`Error::Busy`]
/// immediately instead of deadlocking.
#[derive(Debug)]
pub struct FlashProcess {
    lock: bool,
    error_code: FlashError,
    procedure: Procedure,
    address: u32,
    bank: Bank,
    page: u16,
    pages_to_erase: u16,
    cache_to_restore: CacheState,
}

impl FlashProcess {
    /// Idle, unlocked state
    pub const fn new() -> Self {
        Self {
            lock: false,
            error_code: FlashError::empty(),
            procedure: Procedure::None,
            address: 0,
            bank: Bank::Bank1,
            page: 0,
            pages_to_erase: 0,
            cache_to_restore: CacheState::empty(),
        }
    }

    fn acquire(&mut self) -> Result<()> {
        if self.lock {
            return Err(Error::Busy);
        }
        self.lock = true;
        Ok(())
    }

    fn release(&mut self) {
        self.lock = false;
    }

    /// OR hardware error flags into the persistent error code
    pub(crate) fn latch_errors(&mut self, errors: FlashError) {
        self.error_code |= errors;
    }

    /// Error flags accumulated since the last operation started
    pub fn error_code(&self) -> FlashError {
        self.error_code
    }

    /// The procedure currently in progress
    pub fn procedure(&self) -> Procedure {
        self.procedure
    }

    /// Target address of the running program operation
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Target bank of the running erase operation
    pub fn bank(&self) -> Bank {
        self.bank
    }

    /// Target page of the running erase operation
    pub fn page(&self) -> u16 {
        self.page
    }

    /// Pages still to go in the running erase batch
    pub fn pages_to_erase(&self) -> u16 {
        self.pages_to_erase
    }
}

impl Default for FlashProcess {
    fn default() -> Self {
        Self::new()
    }
}

/// What a single extended-erase call should do
enum EraseOp {
    Mass(Banks),
    Page(Bank, u16),
}

/// The flash engine
///
/// Owns the controller, the shared process state and the busy-state flag.
/// Constructed once at startup and handed to whatever drives the
/// bootloader (command handlers, the memory descriptor for the flash
/// area).
pub struct FlashEngine<C: FlashController> {
    ctrl: C,
    process: FlashProcess,
    busy_stream: bool,
    ob_reload_pending: bool,
}

impl<C: FlashController> FlashEngine<C> {
    /// Wrap a controller
    pub fn new(ctrl: C) -> Self {
        debug_assert!(C::WORD_SIZE == 8 || C::WORD_SIZE == 16);
        Self {
            ctrl,
            process: FlashProcess::new(),
            busy_stream: false,
            ob_reload_pending: false,
        }
    }

    /// Borrow the underlying controller
    pub fn controller(&self) -> &C {
        &self.ctrl
    }

    /// Mutably borrow the underlying controller
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.ctrl
    }

    /// The shared process state
    pub fn process(&self) -> &FlashProcess {
        &self.process
    }

    /// Error flags latched by the most recent operation
    pub fn error_code(&self) -> FlashError {
        self.process.error_code
    }

    /// Enable busy-byte streaming for the next flash procedure
    ///
    /// Used by transports without native wait-state signaling before they
    /// start a long operation. The flag does not survive the procedure:
    /// it is forced off again when the procedure ends, whatever its
    /// outcome.
    pub fn enable_busy_stream(&mut self) {
        self.busy_stream = true;
    }

    /// Disable busy-byte streaming
    pub fn disable_busy_stream(&mut self) {
        self.busy_stream = false;
    }

    /// Whether busy-byte streaming is currently requested
    pub fn busy_stream_enabled(&self) -> bool {
        self.busy_stream
    }

    /// Whether a protection change is waiting for an option-byte reload
    ///
    /// Option-byte mutations only take effect after the option bytes are
    /// reloaded on the next system reset; the reset path consumes this.
    pub fn option_reload_pending(&self) -> bool {
        self.ob_reload_pending
    }

    /// Read one byte
    pub fn read(&self, address: u32) -> u8 {
        self.ctrl.read_byte(address)
    }

    /// Read a little-endian word, as used by the vector table
    pub fn read_u32(&self, address: u32) -> u32 {
        u32::from_le_bytes([
            self.ctrl.read_byte(address),
            self.ctrl.read_byte(address + 1),
            self.ctrl.read_byte(address + 2),
            self.ctrl.read_byte(address + 3),
        ])
    }

    /// Fill `buf` starting at `address`
    pub fn read_into(&self, address: u32, buf: &mut [u8]) {
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = self.ctrl.read_byte(address + offset as u32);
        }
    }

    /// Current readout protection level
    pub fn read_protection_level(&self) -> RdpLevel {
        self.ctrl.read_protection_level()
    }

    /// Mass erase from a host payload: a 2-byte little-endian selector
    ///
    /// Accepts the all-banks, bank-1 and (on dual-bank devices) bank-2
    /// selectors. Anything else, or a short payload, is rejected before
    /// any register is touched.
    pub fn mass_erase(&mut self, payload: &[u8], sink: &mut dyn BusySink) -> Result<()> {
        let selector = wire::read_u16_le(payload).ok_or(Error::PayloadTooShort)?;

        let banks = match selector {
            wire::MASS_ERASE_ALL => {
                if C::DUAL_BANK {
                    Banks::BANK_1 | Banks::BANK_2
                } else {
                    Banks::BANK_1
                }
            }
            wire::MASS_ERASE_BANK1 => Banks::BANK_1,
            wire::MASS_ERASE_BANK2 if C::DUAL_BANK => Banks::BANK_2,
            _ => return Err(Error::InvalidBankSelector),
        };

        log::info!("mass erase, banks {:?}", banks);

        self.ctrl.unlock();
        let result = self.extended_erase(EraseOp::Mass(banks), sink);
        self.ctrl.lock();
        result
    }

    /// Page erase from a host payload: a 2-byte count, then that many
    /// 2-byte little-endian page indices
    ///
    /// Only as many indices as fit in the payload are consumed. A page
    /// index outside the device's bank configuration is skipped and the
    /// batch continues; failed pages are tallied and the call reports
    /// [`Error::EraseFailed`] iff the tally is non-zero. Host tooling
    /// relies on this partial-batch behavior.
    pub fn erase_pages(&mut self, payload: &[u8], sink: &mut dyn BusySink) -> Result<()> {
        let pages = wire::PageList::parse(payload)?;

        self.ctrl.unlock();

        // Drop stale error flags so the batch tallies only its own
        let stale = self.ctrl.errors();
        if !stale.is_empty() {
            self.ctrl.clear_errors(stale);
        }

        self.process.pages_to_erase = pages.len() as u16;

        let mut failures: u32 = 0;
        for page in pages {
            let bank = if page <= BANK1_LAST_PAGE {
                Bank::Bank1
            } else if C::DUAL_BANK && page <= BANK2_LAST_PAGE {
                Bank::Bank2
            } else {
                log::warn!("page {} outside bank configuration, skipped", page);
                self.process.pages_to_erase = self.process.pages_to_erase.saturating_sub(1);
                continue;
            };

            if self.extended_erase(EraseOp::Page(bank, page), sink).is_err() {
                failures += 1;
            }
            self.process.pages_to_erase = self.process.pages_to_erase.saturating_sub(1);
        }

        self.ctrl.lock();

        if failures > 0 {
            log::warn!("{} page(s) failed to erase", failures);
            Err(Error::EraseFailed)
        } else {
            Ok(())
        }
    }

    /// One mutual-exclusion-guarded erase: verify idle, park the caches,
    /// issue, wait, restore
    fn extended_erase(&mut self, op: EraseOp, sink: &mut dyn BusySink) -> Result<()> {
        self.process.acquire()?;
        self.process.error_code = FlashError::empty();

        // Verify the previous operation has drained before issuing
        let mut status = wait::wait_for_last_operation(&mut self.ctrl, &mut self.process, PROGRAM_TIMEOUT);

        if status == HwStatus::Ok {
            // Enabled caches would serve stale lines from the erased
            // region; park them for the duration and note what to restore.
            let caches = self.ctrl.enabled_caches();
            self.ctrl.disable_caches(caches);
            self.process.cache_to_restore = caches;
            self.process.procedure = Procedure::Erase;

            match op {
                EraseOp::Mass(banks) => {
                    self.ctrl.set_mass_erase(banks);
                    self.ctrl.start();
                    status = self.wait_after_start(sink, ERASE_TIMEOUT);
                    self.ctrl.clear_mass_erase(banks);
                }
                EraseOp::Page(bank, page) => {
                    self.process.bank = bank;
                    self.process.page = page;
                    self.ctrl.erase_page(bank, page);
                    status = self.wait_after_start(sink, ERASE_TIMEOUT);
                    self.ctrl.clear_page_erase();
                }
            }

            self.ctrl.flush_and_enable_caches(self.process.cache_to_restore);
            self.process.cache_to_restore = CacheState::empty();
            self.process.procedure = Procedure::None;
        }

        self.process.release();
        // The busy-state flag never outlives the procedure it was armed for
        self.busy_stream = false;

        status_to_result(status)
    }

    fn wait_after_start(&mut self, sink: &mut dyn BusySink, timeout: u32) -> HwStatus {
        if self.busy_stream {
            wait::send_busy_state(&mut self.ctrl, &mut self.process, sink, timeout)
        } else {
            wait::wait_for_last_operation(&mut self.ctrl, &mut self.process, timeout)
        }
    }

    /// Program `data` at `address` in word-granular units
    ///
    /// `address` must be word-aligned. A trailing remainder is copied
    /// into a scratch word padded with the erased-byte value, so the
    /// bytes committed are exactly `data` followed by `0xFF` up to the
    /// next word boundary. No read-back verification is performed here;
    /// that is the caller's responsibility.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let word = C::WORD_SIZE;
        let full = data.len() - data.len() % word;

        log::debug!("programming {} bytes at {:#010x}", data.len(), address);

        self.ctrl.unlock();

        let mut result = Ok(());
        let mut offset = 0usize;
        while offset < full {
            if let Err(e) = self.program_word_guarded(address + offset as u32, &data[offset..offset + word]) {
                result = Err(e);
                break;
            }
            offset += word;
        }

        if result.is_ok() && full < data.len() {
            let mut scratch = [ERASED_BYTE; MAX_WORD_SIZE];
            let remainder = &data[full..];
            scratch[..remainder.len()].copy_from_slice(remainder);
            result = self.program_word_guarded(address + full as u32, &scratch[..word]);
        }

        self.ctrl.lock();
        self.busy_stream = false;
        result
    }

    /// Program one word under the process lock, draining before and
    /// waiting after
    fn program_word_guarded(&mut self, address: u32, word: &[u8]) -> Result<()> {
        self.process.acquire()?;
        self.process.error_code = FlashError::empty();

        let mut status = wait::wait_for_last_operation(&mut self.ctrl, &mut self.process, PROGRAM_TIMEOUT);

        if status == HwStatus::Ok {
            self.process.procedure = Procedure::Program;
            self.process.address = address;
            self.ctrl.program_word(address, word);
            status = wait::wait_for_last_operation(&mut self.ctrl, &mut self.process, PROGRAM_TIMEOUT);
            self.process.procedure = Procedure::None;
        }

        self.process.release();
        status_to_result(status)
    }

    /// Enable or disable write protection
    ///
    /// `payload` carries up to four (start, end) offset pairs applied in
    /// order to the named protection areas; on disable every area is
    /// reset to the full-disable sentinel instead. Supplying fewer pairs
    /// on enable leaves the remaining areas untouched - a payload too
    /// short for even one pair programs nothing and still succeeds.
    /// The change only takes effect after the option bytes reload on the
    /// next reset.
    pub fn set_write_protection(&mut self, enable: bool, payload: &[u8]) -> Result<()> {
        const AREAS: [WrpArea; 4] = [
            WrpArea::Bank1AreaA,
            WrpArea::Bank1AreaB,
            WrpArea::Bank2AreaA,
            WrpArea::Bank2AreaB,
        ];

        let area_count = if C::DUAL_BANK { 4 } else { 2 };

        self.process.acquire()?;
        self.process.error_code = FlashError::empty();
        self.process.procedure = Procedure::OptionByte;

        self.ctrl.unlock_option_bytes();

        let mut status = HwStatus::Ok;

        if enable {
            log::info!("enabling write protection");
            for (area, pair) in AREAS.iter().take(area_count).zip(wire::wrp_pairs(payload)) {
                self.ctrl.program_write_protection(*area, pair.start, pair.end);
                status = wait::wait_for_last_operation(&mut self.ctrl, &mut self.process, PROGRAM_TIMEOUT);
                if status != HwStatus::Ok {
                    break;
                }
            }
        } else {
            log::info!("disabling write protection");
            for area in AREAS.iter().take(area_count) {
                self.ctrl.program_write_protection(
                    *area,
                    wire::WRP_DISABLE.start,
                    wire::WRP_DISABLE.end,
                );
                status = wait::wait_for_last_operation(&mut self.ctrl, &mut self.process, PROGRAM_TIMEOUT);
                if status != HwStatus::Ok {
                    break;
                }
            }
        }

        // Takes effect on the next reset, once the option bytes reload
        self.ob_reload_pending = true;

        self.process.procedure = Procedure::None;
        self.process.release();
        self.ctrl.lock();
        self.busy_stream = false;

        status_to_result(status)
    }

    /// Raise or lower the readout protection level
    ///
    /// The permanent level is refused by policy: a firmware-update
    /// channel must never be able to brick the part irreversibly. The
    /// accepted levels program the option byte and take effect after the
    /// option bytes reload on the next reset.
    pub fn set_read_protection(&mut self, level: RdpLevel) -> Result<()> {
        if level == RdpLevel::Level2 {
            log::warn!("refusing permanent readout protection level");
            return Err(Error::ProtectionRefused);
        }

        self.process.acquire()?;
        self.process.error_code = FlashError::empty();
        self.process.procedure = Procedure::OptionByte;

        self.ctrl.unlock_option_bytes();

        log::info!("readout protection -> {:?}", level);
        self.ctrl.program_read_protection(level);
        let status = wait::wait_for_last_operation(&mut self.ctrl, &mut self.process, PROGRAM_TIMEOUT);

        self.ob_reload_pending = true;

        self.process.procedure = Procedure::None;
        self.process.release();
        self.ctrl.lock();
        self.busy_stream = false;

        status_to_result(status)
    }

    /// Hand control to the application at `address`
    ///
    /// De-initializes the platform, re-enables interrupts, loads the
    /// initial stack pointer from `address` and the entry point from
    /// `address + 4`, then transfers control. Nothing is preserved for a
    /// return.
    pub fn jump(&mut self, system: &mut dyn SystemControl, address: u32) -> ! {
        log::info!("jumping to application at {:#010x}", address);

        system.deinit();
        system.enable_interrupts();

        let stack_pointer = self.read_u32(address);
        let entry_point = self.read_u32(address + 4);

        system.bootstrap(stack_pointer, entry_point)
    }
}

fn status_to_result(status: HwStatus) -> Result<()> {
    match status {
        HwStatus::Ok => Ok(()),
        HwStatus::HardwareFault => Err(Error::HardwareFault),
        HwStatus::Timeout => Err(Error::Timeout),
    }
}
