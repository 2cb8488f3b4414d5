//! End-to-end tests: the bootloader core driven against the in-memory
//! peripherals, the way a host session would drive the real thing.

use std::panic::{catch_unwind, AssertUnwindSafe};

use microboot_core::error::Error;
use microboot_core::flash::{FlashController, FlashEngine, FlashError, RdpLevel};
use microboot_core::interface::{
    CommandTable, Dispatcher, Interface, InterfaceRegistry, Transport, TransportKind,
};
use microboot_core::protocol;
use microboot_dummy::{
    DualBankFlash, QuadWordFlash, RecordingSystem, ScriptedTransport, SimFlashConfig,
    SingleBankFlash,
};

const FLASH_BASE: u32 = 0x0800_0000;
const PAGE_SIZE: usize = 2048;

fn engine() -> FlashEngine<DualBankFlash> {
    FlashEngine::new(DualBankFlash::new_default())
}

// ---------------------------------------------------------------------------
// Program engine
// ---------------------------------------------------------------------------

#[test]
fn write_pads_tail_with_erased_bytes() {
    let mut engine = engine();
    let data: Vec<u8> = (0..20u8).collect();

    engine.write(FLASH_BASE, &data).unwrap();

    let flash = engine.controller();
    // 20 bytes at 8-byte granularity: three words, the last one padded
    assert_eq!(
        flash.programmed,
        [FLASH_BASE, FLASH_BASE + 8, FLASH_BASE + 16]
    );
    assert_eq!(&flash.data()[..20], &data[..]);
    assert_eq!(&flash.data()[20..24], &[0xFF; 4]);
}

#[test]
fn write_quad_word_granularity() {
    let mut engine = FlashEngine::new(QuadWordFlash::new_default());
    let data = [0xA5u8; 20];

    engine.write(FLASH_BASE, &data).unwrap();

    let flash = engine.controller();
    assert_eq!(flash.programmed, [FLASH_BASE, FLASH_BASE + 16]);
    assert_eq!(&flash.data()[..20], &data[..]);
    assert_eq!(&flash.data()[20..32], &[0xFF; 12]);
}

#[test]
fn write_locks_flash_on_exit() {
    let mut engine = engine();
    engine.write(FLASH_BASE, &[0u8; 8]).unwrap();

    let flash = engine.controller();
    assert!(flash.unlock_calls >= 1);
    assert_eq!(flash.lock_calls, flash.unlock_calls);
    assert_eq!(flash.locked_violations, 0);
}

// ---------------------------------------------------------------------------
// Erase engine
// ---------------------------------------------------------------------------

#[test]
fn mass_erase_rejects_unknown_selector() {
    let mut engine = engine();

    // 0x00 0xFF is not a recognized selector
    let result = engine.mass_erase(&[0x00, 0xFF], &mut ());

    assert_eq!(result, Err(Error::InvalidBankSelector));
    let flash = engine.controller();
    // Hardware untouched: no unlock, no mass-erase control bit
    assert_eq!(flash.mass_erase_asserts, 0);
    assert_eq!(flash.unlock_calls, 0);
}

#[test]
fn mass_erase_rejects_short_payload() {
    let mut engine = engine();
    assert_eq!(engine.mass_erase(&[0xFF], &mut ()), Err(Error::PayloadTooShort));
    assert_eq!(engine.controller().unlock_calls, 0);
}

#[test]
fn mass_erase_single_bank() {
    let mut engine = engine();
    let bank_size = engine.controller().size() / 2;
    engine.controller_mut().data_mut().fill(0x00);

    // 0xFFFE little-endian: bank 1 only
    engine.mass_erase(&[0xFE, 0xFF], &mut ()).unwrap();

    let flash = engine.controller();
    assert!(flash.data()[..bank_size].iter().all(|&b| b == 0xFF));
    assert!(flash.data()[bank_size..].iter().all(|&b| b == 0x00));
}

#[test]
fn mass_erase_all_banks() {
    let mut engine = engine();
    engine.controller_mut().data_mut().fill(0x00);

    engine.mass_erase(&[0xFF, 0xFF], &mut ()).unwrap();

    assert!(engine.controller().data().iter().all(|&b| b == 0xFF));
}

#[test]
fn bank2_selector_requires_dual_bank() {
    let mut engine = FlashEngine::new(SingleBankFlash::new_default());
    assert_eq!(
        engine.mass_erase(&[0xFD, 0xFF], &mut ()),
        Err(Error::InvalidBankSelector)
    );
}

#[test]
fn page_erase_consumes_only_what_fits() {
    let mut engine = engine();

    // Count of 3 but only two page indices supplied
    let payload = [0x03, 0x00, 0x05, 0x00, 0x0A, 0x00];
    engine.erase_pages(&payload, &mut ()).unwrap();

    assert_eq!(engine.controller().page_erases, [5, 10]);
}

#[test]
fn page_erase_skips_invalid_entries() {
    let mut engine = engine();

    // 999 is outside any bank; the batch continues and still succeeds
    let payload = [0x03, 0x00, 0x05, 0x00, 0xE7, 0x03, 0x07, 0x00];
    engine.erase_pages(&payload, &mut ()).unwrap();

    assert_eq!(engine.controller().page_erases, [5, 7]);
}

#[test]
fn page_erase_single_bank_range() {
    let mut engine = FlashEngine::new(SingleBankFlash::new_default());

    // Page 130 needs a second bank; only page 3 is erased
    let payload = [0x02, 0x00, 0x03, 0x00, 0x82, 0x00];
    engine.erase_pages(&payload, &mut ()).unwrap();

    assert_eq!(engine.controller().page_erases, [3]);
}

#[test]
fn page_erase_tallies_hardware_failures() {
    let mut engine = engine();
    engine
        .controller_mut()
        .fail_next(FlashError::PROG | FlashError::WRP);

    let payload = [0x02, 0x00, 0x05, 0x00, 0x06, 0x00];
    let result = engine.erase_pages(&payload, &mut ());

    // First page fails, second still runs, overall result is the tally
    assert_eq!(result, Err(Error::EraseFailed));
    assert_eq!(engine.controller().page_erases, [5, 6]);
}

#[test]
fn hardware_errors_latch_into_the_error_code() {
    let mut engine = engine();
    engine
        .controller_mut()
        .fail_next(FlashError::PROG | FlashError::WRP);

    let result = engine.erase_pages(&[0x01, 0x00, 0x05, 0x00], &mut ());

    assert_eq!(result, Err(Error::EraseFailed));
    assert!(engine.error_code().contains(FlashError::WRP));
    assert!(engine.error_code().contains(FlashError::PROG));
    // The flags were cleared in hardware once latched
    assert!(engine.controller().errors().is_empty());
}

#[test]
fn erase_parks_and_restores_caches() {
    let mut engine = engine();
    engine.erase_pages(&[0x01, 0x00, 0x00, 0x00], &mut ()).unwrap();

    let flash = engine.controller();
    assert_eq!(flash.flush_count, 1);
    assert!(!flash.enabled_caches().is_empty());
}

#[test]
fn erase_timeout_is_distinct() {
    let mut engine = engine();
    engine.controller_mut().stick_busy();

    let result = engine.mass_erase(&[0xFE, 0xFF], &mut ());
    assert_eq!(result, Err(Error::Timeout));
    // Flash is still locked again on the way out
    assert_eq!(
        engine.controller().lock_calls,
        engine.controller().unlock_calls
    );
}

// ---------------------------------------------------------------------------
// Busy-state flag
// ---------------------------------------------------------------------------

#[test]
fn busy_flag_without_operation_stays_where_left() {
    let mut engine = engine();
    engine.enable_busy_stream();
    engine.disable_busy_stream();
    assert!(!engine.busy_stream_enabled());
}

#[test]
fn busy_flag_forced_off_after_success() {
    let mut engine = engine();
    let mut host = ScriptedTransport::new(TransportKind::I2c, true);

    engine.enable_busy_stream();
    engine
        .erase_pages(&[0x01, 0x00, 0x05, 0x00], &mut host)
        .unwrap();

    assert!(!engine.busy_stream_enabled());
}

#[test]
fn busy_flag_forced_off_after_failure() {
    let mut engine = engine();
    let mut host = ScriptedTransport::new(TransportKind::I2c, true);
    engine.controller_mut().fail_next(FlashError::PROG);

    engine.enable_busy_stream();
    let result = engine.erase_pages(&[0x01, 0x00, 0x05, 0x00], &mut host);

    assert_eq!(result, Err(Error::EraseFailed));
    assert!(!engine.busy_stream_enabled());
}

#[test]
fn busy_bytes_streamed_while_erasing() {
    let config = SimFlashConfig {
        busy_polls: 3,
        ..SimFlashConfig::default()
    };
    let mut engine = FlashEngine::new(DualBankFlash::new(config));
    let mut host = ScriptedTransport::new(TransportKind::I2c, true);

    engine.enable_busy_stream();
    engine
        .erase_pages(&[0x01, 0x00, 0x05, 0x00], &mut host)
        .unwrap();

    // One busy byte per poll of the running erase
    assert_eq!(host.sent, [protocol::BUSY; 3]);
}

#[test]
fn silent_wait_sends_nothing() {
    let mut engine = engine();
    let mut host = ScriptedTransport::new(TransportKind::Uart, true);

    engine
        .erase_pages(&[0x01, 0x00, 0x05, 0x00], &mut host)
        .unwrap();

    assert!(host.sent.is_empty());
}

// ---------------------------------------------------------------------------
// Protection engine
// ---------------------------------------------------------------------------

#[test]
fn wrp_length_one_programs_nothing() {
    let mut engine = engine();

    // Too short for even one (start, end) pair: documented leniency
    engine.set_write_protection(true, &[0x05]).unwrap();

    assert_eq!(engine.controller().wrp(), [(0x7F, 0x00); 4]);
}

#[test]
fn wrp_enable_applies_pairs_in_area_order() {
    let mut engine = engine();

    engine
        .set_write_protection(true, &[0x00, 0x0F, 0x10, 0x1F])
        .unwrap();

    let wrp = engine.controller().wrp();
    assert_eq!(wrp[0], (0x00, 0x0F));
    assert_eq!(wrp[1], (0x10, 0x1F));
    // Areas without a supplied pair stay untouched
    assert_eq!(wrp[2], (0x7F, 0x00));
    assert_eq!(wrp[3], (0x7F, 0x00));
    assert!(engine.option_reload_pending());
}

#[test]
fn wrp_disable_resets_every_area() {
    let mut engine = engine();
    engine
        .set_write_protection(true, &[0x00, 0x0F, 0x10, 0x1F, 0x20, 0x2F, 0x30, 0x3F])
        .unwrap();

    engine.set_write_protection(false, &[]).unwrap();

    assert_eq!(engine.controller().wrp(), [(0x7F, 0x00); 4]);
    assert!(engine.option_reload_pending());
}

#[test]
fn rdp_accepts_reversible_levels() {
    let mut engine = engine();

    engine.set_read_protection(RdpLevel::Level1).unwrap();

    assert_eq!(engine.read_protection_level(), RdpLevel::Level1);
    assert!(engine.option_reload_pending());
}

#[test]
fn rdp_refuses_permanent_level() {
    let mut engine = engine();

    let result = engine.set_read_protection(RdpLevel::Level2);

    assert_eq!(result, Err(Error::ProtectionRefused));
    assert_eq!(engine.read_protection_level(), RdpLevel::Level0);
    // Refused by policy before touching hardware: nothing to reload
    assert!(!engine.option_reload_pending());
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn erase_program_read_back() {
    let mut engine = engine();
    let page5 = FLASH_BASE + 5 * PAGE_SIZE as u32;

    // Something is already programmed in page 5
    let offset = 5 * PAGE_SIZE;
    engine.controller_mut().data_mut()[offset..offset + PAGE_SIZE].fill(0x00);

    engine
        .erase_pages(&[0x01, 0x00, 0x05, 0x00], &mut ())
        .unwrap();

    let payload: Vec<u8> = (1..=20u8).collect();
    engine.write(page5, &payload).unwrap();

    let mut back = [0u8; 24];
    engine.read_into(page5, &mut back);
    assert_eq!(&back[..20], &payload[..]);
    assert_eq!(&back[20..], &[0xFF; 4]);
}

#[test]
fn jump_hands_off_through_the_vector_table() {
    let mut engine = engine();
    let mut system = RecordingSystem::new();

    // Vector table at the application base: initial SP, then entry point
    engine.controller_mut().data_mut()[..4].copy_from_slice(&0x2002_0000u32.to_le_bytes());
    engine.controller_mut().data_mut()[4..8].copy_from_slice(&0x0800_4125u32.to_le_bytes());

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        engine.jump(&mut system, FLASH_BASE);
    }));

    let message = *outcome.unwrap_err().downcast::<String>().unwrap();
    assert!(message.contains("sp=0x20020000"));
    assert!(message.contains("entry=0x08004125"));
    assert_eq!(system.deinit_calls, 1);
    assert!(system.interrupts_enabled);
}

// ---------------------------------------------------------------------------
// Dispatch loop against the engine
// ---------------------------------------------------------------------------

struct SessionCtx {
    engine: FlashEngine<DualBankFlash>,
    erase_payload: Vec<u8>,
}

fn handle_erase(ctx: &mut SessionCtx, transport: &mut dyn Transport) {
    let payload = ctx.erase_payload.clone();
    let reply = match ctx.engine.erase_pages(&payload, &mut ()) {
        Ok(()) => protocol::ACK,
        Err(_) => protocol::NACK,
    };
    transport.send_byte(reply);
}

#[test]
fn session_detects_dispatches_and_acks() {
    let mut uart = ScriptedTransport::new(TransportKind::Uart, true);
    let mut watchdog = ScriptedTransport::new(TransportKind::WatchdogOnly, false);
    uart.feed(&[protocol::Opcode::ExtendedEraseMemory.byte(), 0x42]);

    let mut table: CommandTable<SessionCtx> = CommandTable::new();
    table.extended_erase_memory = Some(handle_erase);

    let mut registry: InterfaceRegistry<'_, SessionCtx> = InterfaceRegistry::new();
    registry.register(Interface::new(&mut uart, table)).unwrap();
    registry
        .register(Interface::new(&mut watchdog, CommandTable::new()))
        .unwrap();
    registry.configure_all();

    let mut ctx = SessionCtx {
        engine: engine(),
        erase_payload: vec![0x01, 0x00, 0x05, 0x00],
    };

    let mut dispatcher = Dispatcher::new();
    // First tick: detection plus the erase command; second: unknown opcode
    dispatcher.poll(&mut registry, &mut ctx);
    dispatcher.poll(&mut registry, &mut ctx);
    drop(registry);

    assert_eq!(uart.sent, [protocol::ACK, protocol::NACK]);
    assert_eq!(ctx.engine.controller().page_erases, [5]);
    assert!(uart.configured);
    assert!(watchdog.configured);
}
