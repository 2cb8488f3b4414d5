//! Command tables and the dispatcher state machine
//!
//! The dispatcher owns the top of the super-loop: while no host has been
//! detected it keeps arbitrating; once the registry locks an interface it
//! pulls one opcode per tick and routes it through that interface's
//! command table. Failures never cross the dispatcher - anything that goes
//! wrong downstream is reported to the host as protocol bytes.

use super::registry::InterfaceRegistry;
use super::traits::Transport;
use crate::protocol::{self, Opcode};

/// A command handler: receives the caller's context object and the locked
/// transport
///
/// Handler bodies live outside this crate; the dispatcher only routes.
pub type Handler<Ctx> = fn(&mut Ctx, &mut dyn Transport);

/// Per-transport mapping from opcode to optional handler
///
/// An unmapped slot answers with [`protocol::NACK`] when the transport can
/// send at all.
pub struct CommandTable<Ctx> {
    /// GET_COMMAND handler
    pub get_command: Option<Handler<Ctx>>,
    /// GET_VERSION handler
    pub get_version: Option<Handler<Ctx>>,
    /// GET_ID handler
    pub get_id: Option<Handler<Ctx>>,
    /// SPEED handler
    pub speed: Option<Handler<Ctx>>,
    /// READ_MEMORY handler
    pub read_memory: Option<Handler<Ctx>>,
    /// GO handler
    pub go: Option<Handler<Ctx>>,
    /// WRITE_MEMORY handler
    pub write_memory: Option<Handler<Ctx>>,
    /// NS_WRITE_MEMORY handler
    pub ns_write_memory: Option<Handler<Ctx>>,
    /// LEGACY_ERASE_MEMORY handler
    pub legacy_erase_memory: Option<Handler<Ctx>>,
    /// EXTENDED_ERASE_MEMORY handler
    pub extended_erase_memory: Option<Handler<Ctx>>,
    /// NS_ERASE_MEMORY handler
    pub ns_erase_memory: Option<Handler<Ctx>>,
    /// SPECIAL_COMMAND handler
    pub special_command: Option<Handler<Ctx>>,
    /// EXTENDED_SPECIAL_COMMAND handler
    pub extended_special_command: Option<Handler<Ctx>>,
    /// WRITE_PROTECT handler
    pub write_protect: Option<Handler<Ctx>>,
    /// NS_WRITE_PROTECT handler
    pub ns_write_protect: Option<Handler<Ctx>>,
    /// WRITE_UNPROTECT handler
    pub write_unprotect: Option<Handler<Ctx>>,
    /// NS_WRITE_UNPROTECT handler
    pub ns_write_unprotect: Option<Handler<Ctx>>,
    /// READ_PROTECT handler
    pub readout_protect: Option<Handler<Ctx>>,
    /// NS_READ_PROTECT handler
    pub ns_readout_protect: Option<Handler<Ctx>>,
    /// READ_UNPROTECT handler
    pub readout_unprotect: Option<Handler<Ctx>>,
    /// NS_READ_UNPROTECT handler
    pub ns_readout_unprotect: Option<Handler<Ctx>>,
}

impl<Ctx> CommandTable<Ctx> {
    /// An empty table - every opcode answers NACK
    pub const fn new() -> Self {
        Self {
            get_command: None,
            get_version: None,
            get_id: None,
            speed: None,
            read_memory: None,
            go: None,
            write_memory: None,
            ns_write_memory: None,
            legacy_erase_memory: None,
            extended_erase_memory: None,
            ns_erase_memory: None,
            special_command: None,
            extended_special_command: None,
            write_protect: None,
            ns_write_protect: None,
            write_unprotect: None,
            ns_write_unprotect: None,
            readout_protect: None,
            ns_readout_protect: None,
            readout_unprotect: None,
            ns_readout_unprotect: None,
        }
    }

    /// Look up the handler mapped to an opcode
    pub fn handler(&self, opcode: Opcode) -> Option<Handler<Ctx>> {
        match opcode {
            Opcode::GetCommand => self.get_command,
            Opcode::GetVersion => self.get_version,
            Opcode::GetId => self.get_id,
            Opcode::Speed => self.speed,
            Opcode::ReadMemory => self.read_memory,
            Opcode::Go => self.go,
            Opcode::WriteMemory => self.write_memory,
            Opcode::NsWriteMemory => self.ns_write_memory,
            Opcode::LegacyEraseMemory => self.legacy_erase_memory,
            Opcode::ExtendedEraseMemory => self.extended_erase_memory,
            Opcode::NsEraseMemory => self.ns_erase_memory,
            Opcode::SpecialCommand => self.special_command,
            Opcode::ExtendedSpecialCommand => self.extended_special_command,
            Opcode::WriteProtect => self.write_protect,
            Opcode::NsWriteProtect => self.ns_write_protect,
            Opcode::WriteUnprotect => self.write_unprotect,
            Opcode::NsWriteUnprotect => self.ns_write_unprotect,
            Opcode::ReadoutProtect => self.readout_protect,
            Opcode::NsReadoutProtect => self.ns_readout_protect,
            Opcode::ReadoutUnprotect => self.readout_unprotect,
            Opcode::NsReadoutUnprotect => self.ns_readout_unprotect,
        }
    }
}

impl<Ctx> Clone for CommandTable<Ctx> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Ctx> Copy for CommandTable<Ctx> {}

impl<Ctx> Default for CommandTable<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Still arbitrating - no host detected yet
    AwaitingInterface,
    /// Locked onto an interface; terminal until power-on reset
    Processing,
}

/// The command dispatcher driven from the super-loop
pub struct Dispatcher {
    state: DispatcherState,
}

impl Dispatcher {
    /// Create a dispatcher in the arbitration state
    pub const fn new() -> Self {
        Self {
            state: DispatcherState::AwaitingInterface,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Run one dispatcher tick
    ///
    /// While awaiting an interface this polls detection; the tick that
    /// locks an interface continues straight into command processing, so a
    /// host is never left waiting a full loop iteration after detection.
    pub fn poll<Ctx, const N: usize>(
        &mut self,
        registry: &mut InterfaceRegistry<'_, Ctx, N>,
        ctx: &mut Ctx,
    ) {
        if self.state == DispatcherState::AwaitingInterface {
            if registry.detect().is_none() {
                return;
            }
            self.state = DispatcherState::Processing;
        }

        Self::process(registry, ctx);
    }

    /// Read one opcode from the locked interface and route it
    fn process<Ctx, const N: usize>(registry: &mut InterfaceRegistry<'_, Ctx, N>, ctx: &mut Ctx) {
        let Some(interface) = registry.locked_mut() else {
            return;
        };

        // Transports without a command channel (watchdog-only, USB) make
        // this tick a no-op.
        let Some(byte) = interface.transport.get_opcode() else {
            return;
        };

        match Opcode::from_byte(byte) {
            Some(opcode) => match interface.commands.handler(opcode) {
                Some(handler) => handler(ctx, &mut *interface.transport),
                None => {
                    log::debug!("no handler for {:?}, sending NACK", opcode);
                    interface.transport.send_byte(protocol::NACK);
                }
            },
            None => {
                log::warn!("unknown opcode {:#04x}, sending NACK", byte);
                interface.transport.send_byte(protocol::NACK);
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{Interface, TransportKind};
    use std::vec::Vec;

    struct Scripted {
        active: bool,
        opcodes: Vec<u8>,
        cursor: usize,
        sent: Vec<u8>,
    }

    impl Scripted {
        fn new(active: bool, opcodes: &[u8]) -> Self {
            Self {
                active,
                opcodes: opcodes.to_vec(),
                cursor: 0,
                sent: Vec::new(),
            }
        }
    }

    impl Transport for Scripted {
        fn kind(&self) -> TransportKind {
            TransportKind::Uart
        }

        fn configure(&mut self) {}

        fn detect_activity(&mut self) -> bool {
            self.active
        }

        fn get_opcode(&mut self) -> Option<u8> {
            let byte = self.opcodes.get(self.cursor).copied()?;
            self.cursor += 1;
            Some(byte)
        }

        fn send_byte(&mut self, byte: u8) {
            self.sent.push(byte);
        }
    }

    /// Watchdog-style registrant: no command channel, no reply channel
    struct Mute {
        active: bool,
    }

    impl Transport for Mute {
        fn kind(&self) -> TransportKind {
            TransportKind::WatchdogOnly
        }

        fn configure(&mut self) {}

        fn detect_activity(&mut self) -> bool {
            self.active
        }
    }

    fn count_version(count: &mut u32, _transport: &mut dyn Transport) {
        *count += 1;
    }

    #[test]
    fn stays_awaiting_without_activity() {
        let mut transport = Scripted::new(false, &[0x01]);
        let mut registry: InterfaceRegistry<'_, u32, 2> = InterfaceRegistry::new();
        registry
            .register(Interface::new(&mut transport, CommandTable::new()))
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        let mut count = 0u32;
        dispatcher.poll(&mut registry, &mut count);

        assert_eq!(dispatcher.state(), DispatcherState::AwaitingInterface);
        assert_eq!(count, 0);
    }

    #[test]
    fn first_poll_detects_and_processes() {
        let mut transport = Scripted::new(true, &[0x01]);
        let mut table = CommandTable::new();
        table.get_version = Some(count_version as Handler<u32>);

        let mut registry: InterfaceRegistry<'_, u32, 2> = InterfaceRegistry::new();
        registry
            .register(Interface::new(&mut transport, table))
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        let mut count = 0u32;
        dispatcher.poll(&mut registry, &mut count);

        // Detection and the first command happen within the same tick
        assert_eq!(dispatcher.state(), DispatcherState::Processing);
        assert_eq!(count, 1);
    }

    #[test]
    fn unknown_opcode_gets_nack() {
        let mut transport = Scripted::new(true, &[0x42]);
        let mut registry: InterfaceRegistry<'_, u32, 2> = InterfaceRegistry::new();
        registry
            .register(Interface::new(&mut transport, CommandTable::new()))
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        let mut count = 0u32;
        dispatcher.poll(&mut registry, &mut count);
        drop(registry);

        assert_eq!(transport.sent, [protocol::NACK]);
    }

    #[test]
    fn absent_handler_gets_nack() {
        // Valid opcode, but nothing mapped in the table
        let mut transport = Scripted::new(true, &[Opcode::GetId.byte()]);
        let mut registry: InterfaceRegistry<'_, u32, 2> = InterfaceRegistry::new();
        registry
            .register(Interface::new(&mut transport, CommandTable::new()))
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        let mut count = 0u32;
        dispatcher.poll(&mut registry, &mut count);
        drop(registry);

        assert_eq!(transport.sent, [protocol::NACK]);
    }

    #[test]
    fn no_command_channel_ticks_are_noops() {
        let mut transport = Mute { active: true };
        let mut registry: InterfaceRegistry<'_, u32, 2> = InterfaceRegistry::new();
        registry
            .register(Interface::new(&mut transport, CommandTable::new()))
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        let mut count = 0u32;
        dispatcher.poll(&mut registry, &mut count);
        dispatcher.poll(&mut registry, &mut count);

        assert_eq!(dispatcher.state(), DispatcherState::Processing);
        assert_eq!(count, 0);
    }
}
