//! Synchronization primitives for a single core.
//!
//! Interrupt masking is the only lock: [`CsMutex`] hands out its contents
//! against a live critical section, and [`Event`] lets the dispatch loop
//! sleep until an interrupt handler signals it.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::Cpu;
use crate::critical::{self, CriticalSection};

/// State shared between thread and interrupt context.
///
/// Access requires a live [`CriticalSection`], so the borrow can only exist
/// while interrupts are masked. Pair with `Cell`/`RefCell` for mutation.
pub struct CsMutex<T> {
    inner: T,
}

// Single core: masked interrupts exclude every other context.
unsafe impl<T: Send> Sync for CsMutex<T> {}

impl<T> CsMutex<T> {
    pub const fn new(inner: T) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn borrow<'cs>(&'cs self, _cs: &'cs CriticalSection<'_>) -> &'cs T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

/// One-shot wakeup flag, signalled from interrupt context.
pub struct Event {
    signalled: AtomicBool,
}

impl Event {
    pub const fn new() -> Self {
        Self {
            signalled: AtomicBool::new(false),
        }
    }

    /// Interrupt-safe; only sets the flag.
    pub fn signal(&self) {
        self.signalled.store(true, Ordering::Release);
    }

    /// Consume a pending signal without sleeping.
    pub fn take(&self) -> bool {
        if self.signalled.load(Ordering::Acquire) {
            self.signalled.store(false, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Sleep until signalled, then clear the flag.
    ///
    /// The flag is checked with interrupts masked and WFI still wakes on a
    /// masked IRQ, so a signal between check and sleep is not lost.
    pub fn wait(&self, cpu: &dyn Cpu) {
        critical::need_sleep(cpu);
        loop {
            let cs = CriticalSection::enter(cpu);
            // Take before deciding so a signal landing here is consumed once.
            if self.take() {
                return;
            }
            cpu.wait_for_interrupt();
            drop(cs);
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
