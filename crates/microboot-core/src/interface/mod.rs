//! Transport interfaces, registration and command dispatch
//!
//! A host talks to the bootloader over exactly one of the compiled-in
//! transports. Each transport registers once at startup together with its
//! command table; the registry then polls for activity and locks onto the
//! first transport a host shows up on, for the rest of the process
//! lifetime. The dispatcher pulls opcodes from the locked transport and
//! routes them through the command table.

mod dispatch;
mod registry;
mod traits;

pub use dispatch::{CommandTable, Dispatcher, DispatcherState, Handler};
pub use registry::{Interface, InterfaceRegistry, INTERFACES_SUPPORTED};
pub use traits::{Transport, TransportKind, TransportSink};
