//! ARM946 architecture support
//!
//! - CPSR access for the critical-section primitive
//! - CP15 write-buffer drain and wait-for-interrupt
//! - Data cache maintenance and delay through bootrom routines

pub mod peripherals;

use crate::arch::traits::Cpu;
use crate::platform;

/// The ARM946 core this firmware runs on.
#[derive(Clone, Copy, Default)]
pub struct Arm946;

/// Call a bootrom routine taking `(addr, len)`.
///
/// # Safety
/// `entry` must be the address of a bootrom routine with that signature.
#[inline]
unsafe fn bfn_range(entry: usize, addr: usize, len: usize) {
    let f: extern "C" fn(u32, u32) = core::mem::transmute(entry);
    f(addr as u32, len as u32);
}

impl Cpu for Arm946 {
    #[inline]
    fn status(&self) -> u32 {
        let sr: u32;
        unsafe {
            core::arch::asm!("mrs {}, cpsr", out(reg) sr, options(nomem, nostack));
        }
        sr
    }

    #[inline]
    fn set_status_control(&self, value: u32) {
        // Acts as a compiler barrier: critical sections must not leak accesses.
        unsafe {
            core::arch::asm!("msr cpsr_c, {}", in(reg) value, options(nostack));
        }
    }

    #[inline]
    fn data_sync_barrier(&self) {
        unsafe {
            core::arch::asm!("mcr p15, 0, {}, c7, c10, 4", in(reg) 0u32, options(nostack));
        }
    }

    fn dcache_writeback_range(&self, addr: usize, len: usize) {
        unsafe { bfn_range(platform::BFN_WRITEBACK_DCACHE_RANGE, addr, len) }
    }

    fn dcache_invalidate_range(&self, addr: usize, len: usize) {
        unsafe { bfn_range(platform::BFN_INVALIDATE_DCACHE_RANGE, addr, len) }
    }

    fn delay_cycles(&self, cycles: u32) {
        unsafe {
            let f: extern "C" fn(u32) = core::mem::transmute(platform::BFN_WAITCYCLES);
            f(cycles);
        }
    }

    fn wait_for_interrupt(&self) {
        self.data_sync_barrier();
        unsafe {
            core::arch::asm!("mcr p15, 0, {}, c7, c0, 4", in(reg) 0u32, options(nostack));
        }
    }
}
