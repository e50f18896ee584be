//! Virtual Interrupt Controller
//!
//! Mediates real interrupt lines into a guest-visible pending/mask model.
//! Per line: Masked → (unmask) → Armed → (hardware fire) → Pending →
//! (guest IRQGET) → Armed.
//!
//! The pending and armed bitmasks are touched from both the fire handler
//! (interrupt context) and the dispatch loop, so every entry point takes a
//! [`CriticalSection`].

use core::cell::Cell;

use crate::critical::{self, CriticalSection};
use crate::sync::CsMutex;
use crate::transport::SyncSignal;

/// Number of virtual lines; also the "nothing pending" reply.
pub const VIRQ_LINES: u32 = 32;
pub const NONE_PENDING: u32 = VIRQ_LINES;

/// Handler installed on a real interrupt line, called with the line number.
pub type IrqHandler = fn(u32);

/// The real interrupt controller driver.
pub trait IrqChip {
    /// Enable `line`, dispatching to `handler` when it fires.
    fn enable(&mut self, line: u32, handler: Option<IrqHandler>);

    /// Disable `line` and drop its handler.
    fn disable(&mut self, line: u32);
}

#[inline]
fn bit(line: u32) -> u32 {
    debug_assert!(line < VIRQ_LINES, "virtual IRQ line {line} out of range");
    1 << (line & (VIRQ_LINES - 1))
}

/// Pending/armed state for the guest's virtual interrupt lines.
pub struct VirqController {
    pending: CsMutex<Cell<u32>>,
    armed: CsMutex<Cell<u32>>,
    /// Installed on every armed line; must end up in [`VirqController::fire`].
    on_fire: IrqHandler,
}

impl VirqController {
    pub const fn new(on_fire: IrqHandler) -> Self {
        Self {
            pending: CsMutex::new(Cell::new(0)),
            armed: CsMutex::new(Cell::new(0)),
            on_fire,
        }
    }

    /// Clear all pending bits.
    ///
    /// Lines armed before the reset stay armed in hardware; this is paired
    /// with a full interrupt controller reset at boot.
    pub fn reset(&self, cs: &CriticalSection<'_>) {
        self.pending.borrow(cs).set(0);
    }

    /// Arm the real interrupt source for `line`.
    pub fn unmask(&self, cs: &CriticalSection<'_>, chip: &mut dyn IrqChip, line: u32) {
        critical::need_critical(cs.cpu());

        chip.enable(line, Some(self.on_fire));
        let armed = self.armed.borrow(cs);
        armed.set(armed.get() | bit(line));
        log::trace!("virq: unmask {line}");
    }

    /// Disarm `line` and drop any pending fire for it.
    pub fn mask(&self, cs: &CriticalSection<'_>, chip: &mut dyn IrqChip, line: u32) {
        critical::need_critical(cs.cpu());

        chip.disable(line);
        let armed = self.armed.borrow(cs);
        armed.set(armed.get() & !bit(line));
        let pending = self.pending.borrow(cs);
        pending.set(pending.get() & !bit(line));
        log::trace!("virq: mask {line}");
    }

    /// Hardware fire path (interrupt context).
    ///
    /// Marks `line` pending and pokes the guest so it polls with IRQGET.
    /// Fires on lines that are not armed are dropped.
    pub fn fire(&self, cs: &CriticalSection<'_>, line: u32, sync: &dyn SyncSignal) {
        if self.armed.borrow(cs).get() & bit(line) == 0 {
            return;
        }
        let pending = self.pending.borrow(cs);
        pending.set(pending.get() | bit(line));
        sync.trigger();
    }

    /// Pop the highest-numbered pending line, or [`NONE_PENDING`].
    pub fn get_pending(&self, cs: &CriticalSection<'_>) -> u32 {
        critical::need_critical(cs.cpu());

        let pending = self.pending.borrow(cs);
        let bits = pending.get();
        if bits == 0 {
            return NONE_PENDING;
        }
        let line = VIRQ_LINES - 1 - bits.leading_zeros();
        pending.set(bits & !bit(line));
        line
    }

    /// Snapshot of the pending bitmask.
    pub fn pending(&self, cs: &CriticalSection<'_>) -> u32 {
        self.pending.borrow(cs).get()
    }

    /// Snapshot of the armed bitmask.
    pub fn armed(&self, cs: &CriticalSection<'_>) -> u32 {
        self.armed.borrow(cs).get()
    }
}
