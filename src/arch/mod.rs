//! Architecture-specific code
//!
//! `traits` is portable; the ARM946 implementation is only built for the
//! firmware target.

pub mod traits;

#[cfg(target_arch = "arm")]
pub mod arm;

pub use traits::{Cpu, INT_MASK};
