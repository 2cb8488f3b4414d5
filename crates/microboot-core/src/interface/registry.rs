//! Interface registry and host detection
//!
//! Registration order is detection priority: the first registered
//! transport that reports activity wins, and the lock is never released
//! until power-on reset.

use heapless::Vec;

use super::dispatch::CommandTable;
use super::traits::Transport;
use crate::error::{Error, Result};

/// Default number of interface slots compiled into a firmware image
pub const INTERFACES_SUPPORTED: usize = 6;

/// One registered transport together with its command table
pub struct Interface<'t, Ctx> {
    /// The transport adapter
    pub transport: &'t mut dyn Transport,
    /// Per-transport opcode-to-handler mapping
    pub commands: CommandTable<Ctx>,
}

impl<'t, Ctx> Interface<'t, Ctx> {
    /// Pair a transport with its command table
    pub fn new(transport: &'t mut dyn Transport, commands: CommandTable<Ctx>) -> Self {
        Self {
            transport,
            commands,
        }
    }
}

/// Ordered, fixed-capacity collection of registered interfaces
///
/// Holds at most `N` interfaces and the index of the locked one once
/// detection has succeeded.
pub struct InterfaceRegistry<'t, Ctx, const N: usize = INTERFACES_SUPPORTED> {
    interfaces: Vec<Interface<'t, Ctx>, N>,
    locked: Option<usize>,
}

impl<'t, Ctx, const N: usize> InterfaceRegistry<'t, Ctx, N> {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            interfaces: Vec::new(),
            locked: None,
        }
    }

    /// Append an interface to the registry
    ///
    /// Fails with [`Error::RegistryFull`] once all `N` slots are taken;
    /// earlier registrations are unaffected.
    pub fn register(&mut self, interface: Interface<'t, Ctx>) -> Result<()> {
        let kind = interface.transport.kind();
        self.interfaces
            .push(interface)
            .map_err(|_| Error::RegistryFull)?;
        log::debug!("registered {} interface", kind.name());
        Ok(())
    }

    /// Number of registered interfaces
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// Whether no interface has been registered
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Configure every registered transport
    pub fn configure_all(&mut self) {
        for interface in self.interfaces.iter_mut() {
            interface.transport.configure();
        }
    }

    /// Return every registered transport to its reset state
    pub fn deinit_all(&mut self) {
        for interface in self.interfaces.iter_mut() {
            interface.transport.deinit();
        }
    }

    /// Poll for host activity and lock onto the first active transport
    ///
    /// First-match, not best-match: polling stops at the earliest
    /// registered transport reporting activity. Once locked the result is
    /// cached and later calls return it without re-polling.
    pub fn detect(&mut self) -> Option<usize> {
        if self.locked.is_some() {
            return self.locked;
        }

        for (index, interface) in self.interfaces.iter_mut().enumerate() {
            if interface.transport.detect_activity() {
                log::info!("host detected on {}", interface.transport.kind().name());
                self.locked = Some(index);
                return self.locked;
            }
        }

        None
    }

    /// Index of the locked interface, if detection has succeeded
    pub fn locked_index(&self) -> Option<usize> {
        self.locked
    }

    /// The locked interface, if detection has succeeded
    pub fn locked_mut(&mut self) -> Option<&mut Interface<'t, Ctx>> {
        let index = self.locked?;
        self.interfaces.get_mut(index)
    }
}

impl<'t, Ctx, const N: usize> Default for InterfaceRegistry<'t, Ctx, N> {
    fn default() -> Self {
        Self::new()
    }
}
