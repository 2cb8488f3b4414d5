//! Busy-wait / completion primitives
//!
//! Every code path that starts a flash-controller operation goes through
//! one of these before issuing the next operation or reading the affected
//! region. While flash is busy the core may be unable to fetch code from
//! it, so on bare-metal targets these routines are placed in RAM via the
//! `.ramfunc` section; the linker script keeps that section resident.

use super::controller::{BusySink, FlashController};
use super::engine::FlashProcess;

/// Fine-grained completion status, internal to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HwStatus {
    /// Operation completed without error flags
    Ok,
    /// Controller latched one or more error flags
    HardwareFault,
    /// Tick budget exhausted while still busy
    Timeout,
}

/// Wait for the running flash operation to complete
///
/// Polls the busy flag within `timeout` ticks, then latches any error
/// flags into the shared error code, clears them in hardware, and clears
/// the end-of-operation flag.
#[cfg_attr(target_os = "none", link_section = ".ramfunc")]
#[inline(never)]
pub(crate) fn wait_for_last_operation<C: FlashController>(
    ctrl: &mut C,
    process: &mut FlashProcess,
    timeout: u32,
) -> HwStatus {
    let mut tick: u32 = 0;

    while ctrl.is_busy() {
        if tick > timeout {
            return HwStatus::Timeout;
        }
        tick += 1;
    }

    finish(ctrl, process)
}

/// Wait for the running flash operation, streaming busy bytes to the host
///
/// Identical to [`wait_for_last_operation`] except that each poll
/// iteration emits a busy indication through `sink`, keeping hosts on
/// transports without wait-state signaling from timing out.
#[cfg_attr(target_os = "none", link_section = ".ramfunc")]
#[inline(never)]
pub(crate) fn send_busy_state<C: FlashController>(
    ctrl: &mut C,
    process: &mut FlashProcess,
    sink: &mut dyn BusySink,
    timeout: u32,
) -> HwStatus {
    let mut tick: u32 = 0;

    while ctrl.is_busy() {
        if tick > timeout {
            return HwStatus::Timeout;
        }
        tick += 1;
        sink.send_busy();
    }

    finish(ctrl, process)
}

/// Latch and clear error flags, then clear end-of-operation
#[cfg_attr(target_os = "none", link_section = ".ramfunc")]
#[inline(never)]
fn finish<C: FlashController>(ctrl: &mut C, process: &mut FlashProcess) -> HwStatus {
    let errors = ctrl.errors();

    if !errors.is_empty() {
        process.latch_errors(errors);
        ctrl.clear_errors(errors);
        return HwStatus::HardwareFault;
    }

    if ctrl.end_of_operation() {
        ctrl.clear_end_of_operation();
    }

    HwStatus::Ok
}
