//! Register access at a runtime-selected width.
//!
//! The dispatcher reaches hardware only through [`RegisterBus`], so tests
//! substitute a simulated memory map for real MMIO.

/// Register access width carried in a command word's `size` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    /// Decode a wire width code (0=byte, 1=half, 2=word).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Width::Byte),
            1 => Some(Width::Half),
            2 => Some(Width::Word),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Width::Byte => 0,
            Width::Half => 1,
            Width::Word => 2,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }

    /// Mask selecting the bits a register of this width holds.
    pub fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Half => 0xFFFF,
            Width::Word => 0xFFFF_FFFF,
        }
    }
}

/// Register load/store at a physical address.
pub trait RegisterBus {
    /// Load a register, zero-extended to 32 bits.
    fn read(&mut self, addr: u32, width: Width) -> u32;

    /// Store the low `width` bits of `value`.
    fn write(&mut self, addr: u32, width: Width, value: u32);
}

/// Volatile MMIO on the real address space.
#[derive(Clone, Copy, Default)]
pub struct Mmio;

impl RegisterBus for Mmio {
    #[inline]
    fn read(&mut self, addr: u32, width: Width) -> u32 {
        let addr = addr as usize;
        // The peer is trusted to name valid, naturally aligned registers.
        unsafe {
            match width {
                Width::Byte => core::ptr::read_volatile(addr as *const u8) as u32,
                Width::Half => core::ptr::read_volatile(addr as *const u16) as u32,
                Width::Word => core::ptr::read_volatile(addr as *const u32),
            }
        }
    }

    #[inline]
    fn write(&mut self, addr: u32, width: Width, value: u32) {
        let addr = addr as usize;
        unsafe {
            match width {
                Width::Byte => core::ptr::write_volatile(addr as *mut u8, value as u8),
                Width::Half => core::ptr::write_volatile(addr as *mut u16, value as u16),
                Width::Word => core::ptr::write_volatile(addr as *mut u32, value),
            }
        }
    }
}
