//! Architecture-Portable Trait Definitions
//!
//! The firmware core only talks to the processor through these traits, so
//! the dispatcher, the virtual interrupt controller and the block backend
//! run unchanged against the simulated processor used by the unit tests.

/// CPSR interrupt mask: IRQ (bit 7) and FIQ (bit 6).
pub const INT_MASK: u32 = 0xC0;

/// Processor operations needed by the core.
///
/// The status register accessors back the critical-section primitive; the
/// cache and barrier operations keep buffers shared with the guest coherent.
pub trait Cpu {
    /// Read the current program status register.
    fn status(&self) -> u32;

    /// Write the control field of the status register (mode and I/F bits).
    fn set_status_control(&self, value: u32);

    /// Drain the write buffer before continuing.
    fn data_sync_barrier(&self);

    fn dcache_writeback_range(&self, addr: usize, len: usize);
    fn dcache_invalidate_range(&self, addr: usize, len: usize);

    /// Busy-wait for roughly `cycles` processor cycles. Part of the bootrom
    /// routine set; no driver on this board currently needs settle time.
    fn delay_cycles(&self, cycles: u32);

    /// Sleep until an interrupt is pending. Wakes even when the interrupt
    /// is masked in the status register.
    fn wait_for_interrupt(&self);
}
