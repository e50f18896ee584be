//! Firmware for the ARM946 secondary processor.
//!
//! The guest processor has no direct hardware access; this firmware lends it
//! registers (through PXI commands), interrupt lines (through a virtual
//! pending/mask model) and block storage (through a virtio-blk backend).
//!
//! Everything except `arch::arm` and the binary is portable and unit-tested
//! on the host against the doubles in `sim`.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod command;
pub mod critical;
pub mod devices;
pub mod logger;
pub mod mmio;
pub mod platform;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod virq;

#[cfg(test)]
mod sim;
