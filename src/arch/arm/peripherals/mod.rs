//! ARM946 Peripheral Drivers
//!
//! - IRQ controller (IE/IF registers, handler table)
//! - PXI inter-processor word FIFO

pub mod irq;
pub mod pxi;

pub use irq::Arm9Irq;
pub use pxi::Pxi;

/// Read a 32-bit peripheral register
#[inline]
fn read_reg(addr: usize) -> u32 {
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

/// Write a 32-bit peripheral register
#[inline]
fn write_reg(addr: usize, value: u32) {
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}
