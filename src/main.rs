//! microboot - Bootloader core simulator
//!
//! Drives the `microboot-core` bootloader exactly the way firmware would -
//! register transports and memory areas, then spin the dispatcher - but
//! against the in-memory peripherals from `microboot-dummy`, with a host
//! session scripted from the command line. Useful for poking at the
//! protocol without hardware.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};

use microboot_core::flash::{FlashEngine, FlashRegion};
use microboot_core::interface::{
    CommandTable, Dispatcher, DispatcherState, Interface, InterfaceRegistry, Transport,
    TransportSink,
};
use microboot_core::memory::MemoryRegion;
use microboot_core::profile::DeviceProfile;
use microboot_core::protocol::{self, Opcode};
use microboot_dummy::{DualBankFlash, ScriptedTransport, SimFlashConfig};

use std::collections::VecDeque;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid profile: {0}")]
    Profile(String),
    #[error("invalid hex payload: {0}")]
    Payload(String),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let profile = load_profile(cli.profile.as_deref())?;

    match cli.command {
        Commands::Info => run_info(&profile),
        Commands::Session {
            erase,
            data,
            address,
        } => run_session(&profile, &erase, &data, address)?,
    }

    Ok(())
}

fn load_profile(path: Option<&Path>) -> Result<DeviceProfile, SimError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            DeviceProfile::from_toml_str(&text).map_err(|e| SimError::Profile(e.to_string()))
        }
        None => Ok(DeviceProfile::default()),
    }
}

fn parse_hex(s: &str) -> Result<Vec<u8>, SimError> {
    if s.len() % 2 != 0 {
        return Err(SimError::Payload(format!("odd number of digits in '{}'", s)));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|e| SimError::Payload(format!("'{}': {}", &s[i..i + 2], e)))
        })
        .collect()
}

fn run_info(profile: &DeviceProfile) {
    println!("Device:    {} (id {:#06x})", profile.name, profile.product_id);
    println!("Protocol:  version {:#04x}", profile.version);

    let flash = profile.flash.descriptor();
    println!(
        "Flash:     {:#010x}..={:#010x}  {} KiB, {} pages of {} B{}",
        flash.start,
        flash.end,
        profile.flash.size / 1024,
        profile.flash.page_count(),
        profile.flash.page_size,
        if profile.flash.dual_bank {
            ", dual bank"
        } else {
            ""
        }
    );

    let ram = profile.ram_descriptor();
    println!(
        "RAM:       {:#010x}..={:#010x}  {} KiB",
        ram.start,
        ram.end,
        profile.ram_size / 1024
    );

    println!("Commands:");
    for opcode in protocol::OPCODES {
        println!("  {:#04x}  {:?}", opcode.byte(), opcode);
    }
}

/// Everything the scripted command handlers reach for
struct SessionCtx {
    region: FlashRegion<DualBankFlash>,
    version: u8,
    erase_payloads: VecDeque<Vec<u8>>,
    write_payloads: VecDeque<(u32, Vec<u8>)>,
}

fn cmd_get_version(ctx: &mut SessionCtx, transport: &mut dyn Transport) {
    transport.send_byte(protocol::ACK);
    transport.send_byte(ctx.version);
    transport.send_byte(protocol::ACK);
}

fn cmd_erase(ctx: &mut SessionCtx, transport: &mut dyn Transport) {
    let Some(payload) = ctx.erase_payloads.pop_front() else {
        transport.send_byte(protocol::NACK);
        return;
    };

    let result = ctx
        .region
        .erase(&payload, &mut TransportSink(&mut *transport));
    match result {
        Ok(()) => transport.send_byte(protocol::ACK),
        Err(e) => {
            log::error!("erase failed: {}", e);
            transport.send_byte(protocol::NACK);
        }
    }
}

fn cmd_write(ctx: &mut SessionCtx, transport: &mut dyn Transport) {
    let Some((address, data)) = ctx.write_payloads.pop_front() else {
        transport.send_byte(protocol::NACK);
        return;
    };

    match ctx.region.write(address, &data) {
        Ok(()) => transport.send_byte(protocol::ACK),
        Err(e) => {
            log::error!("write failed: {}", e);
            transport.send_byte(protocol::NACK);
        }
    }
}

fn run_session(
    profile: &DeviceProfile,
    erase: &[u16],
    data: &str,
    address: Option<u32>,
) -> Result<(), SimError> {
    let geometry = profile.flash;
    if geometry.word_size != 8 {
        log::warn!(
            "profile asks for {}-byte words, emulated device programs 8-byte words",
            geometry.word_size
        );
    }

    let banks: u32 = if geometry.dual_bank { 2 } else { 1 };
    let flash = DualBankFlash::new(SimFlashConfig {
        base: geometry.base,
        page_size: geometry.page_size,
        pages_per_bank: (geometry.page_count() / banks) as u16,
        busy_polls: 2,
    });
    let engine = FlashEngine::new(flash);
    let region = FlashRegion::new(
        geometry.base,
        geometry.end(),
        geometry.size,
        engine,
    );

    // Stage the host side of the session: one erase batch, one write
    let payload = parse_hex(data)?;
    let target = address.unwrap_or_else(|| geometry.page_address(erase.first().copied().unwrap_or(0)));

    let mut erase_payload = Vec::with_capacity(2 + erase.len() * 2);
    erase_payload.extend_from_slice(&(erase.len() as u16).to_le_bytes());
    for page in erase {
        erase_payload.extend_from_slice(&page.to_le_bytes());
    }

    let mut uart = ScriptedTransport::new(microboot_core::interface::TransportKind::Uart, true);
    let mut watchdog =
        ScriptedTransport::new(microboot_core::interface::TransportKind::WatchdogOnly, false);
    uart.feed(&[
        Opcode::GetVersion.byte(),
        Opcode::ExtendedEraseMemory.byte(),
        Opcode::WriteMemory.byte(),
        0xAA, // not a command - shows the NACK path
    ]);

    let mut table: CommandTable<SessionCtx> = CommandTable::new();
    table.get_version = Some(cmd_get_version);
    table.extended_erase_memory = Some(cmd_erase);
    table.write_memory = Some(cmd_write);

    let mut registry: InterfaceRegistry<'_, SessionCtx> = InterfaceRegistry::new();
    registry
        .register(Interface::new(&mut uart, table))
        .expect("interface capacity");
    registry
        .register(Interface::new(&mut watchdog, CommandTable::new()))
        .expect("interface capacity");
    registry.configure_all();

    let mut ctx = SessionCtx {
        region,
        version: profile.version,
        erase_payloads: VecDeque::from([erase_payload]),
        write_payloads: VecDeque::from([(target, payload.clone())]),
    };

    let mut dispatcher = Dispatcher::new();
    for _ in 0..8 {
        dispatcher.poll(&mut registry, &mut ctx);
    }
    assert_eq!(dispatcher.state(), DispatcherState::Processing);
    registry.deinit_all();
    drop(registry);

    println!("Host session complete.");
    println!("  bytes from device: {:02x?}", uart.sent);

    let word = payload.len().div_ceil(8) * 8;
    let mut back = vec![0u8; word];
    ctx.region.engine().read_into(target, &mut back);
    println!("  flash @ {:#010x}: {:02x?}", target, back);
    println!(
        "  errors latched:    {:?}",
        ctx.region.engine().error_code()
    );

    Ok(())
}
