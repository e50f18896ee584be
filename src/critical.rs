//! Critical sections on a single core.
//!
//! Masking IRQ/FIQ in the CPSR is the only lock this firmware has. A section
//! saves exactly the I/F bits on entry and restores exactly those bits on
//! exit; every other status bit keeps whatever value it has at exit time.
//!
//! Sections nest in strict LIFO order and are not counted: entering while
//! already masked hands back an "already masked" state, and its `leave`
//! keeps interrupts masked.

use crate::arch::{Cpu, INT_MASK};

/// Interrupt-mask bits saved by [`enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a saved interrupt state must be passed back to `leave`"]
pub struct IrqState(u32);

impl IrqState {
    /// Whether interrupts were already masked when the section was entered.
    pub fn was_masked(self) -> bool {
        self.0 != 0
    }
}

/// Mask interrupts and return the previous mask bits.
#[inline]
pub fn enter(cpu: &dyn Cpu) -> IrqState {
    let sr = cpu.status();
    cpu.set_status_control(sr | INT_MASK);
    IrqState(sr & INT_MASK)
}

/// Restore the mask bits saved by the matching [`enter`].
#[inline]
pub fn leave(cpu: &dyn Cpu, state: IrqState) {
    let sr = cpu.status();
    cpu.set_status_control((sr & !INT_MASK) | state.0);
}

/// Returns true if interrupts are currently masked.
#[inline]
pub fn is_in_critical(cpu: &dyn Cpu) -> bool {
    cpu.status() & INT_MASK != 0
}

/// Unmask interrupts unconditionally. Used once at boot.
#[inline]
pub fn interrupt_enable(cpu: &dyn Cpu) {
    let sr = cpu.status();
    cpu.set_status_control(sr & !INT_MASK);
}

/// Debug check: the caller must hold a critical section.
#[inline]
pub fn need_critical(cpu: &dyn Cpu) {
    debug_assert!(is_in_critical(cpu), "called outside a critical section");
}

/// Debug check: the caller may block, so interrupts must be enabled.
#[inline]
pub fn need_sleep(cpu: &dyn Cpu) {
    debug_assert!(!is_in_critical(cpu), "may sleep, but interrupts are masked");
}

/// Scope guard over [`enter`]/[`leave`].
///
/// Holding a `&CriticalSection` is the proof required to touch state shared
/// with interrupt context (see [`crate::sync::CsMutex`]).
pub struct CriticalSection<'a> {
    cpu: &'a dyn Cpu,
    state: IrqState,
}

impl<'a> CriticalSection<'a> {
    pub fn enter(cpu: &'a dyn Cpu) -> Self {
        let state = enter(cpu);
        Self { cpu, state }
    }

    pub fn cpu(&self) -> &'a dyn Cpu {
        self.cpu
    }

    pub fn state(&self) -> IrqState {
        self.state
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        leave(self.cpu, self.state);
    }
}

/// Run `f` with interrupts masked.
#[inline]
pub fn with<R>(cpu: &dyn Cpu, f: impl FnOnce(&CriticalSection<'_>) -> R) -> R {
    let cs = CriticalSection::enter(cpu);
    f(&cs)
}
