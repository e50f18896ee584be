//! Platform/Board Constants (ARM946 secondary processor)
//!
//! All board-specific addresses and sizes live here so they can be
//! changed in one place when targeting a different platform.

// ── Peripheral window ────────────────────────────────────────────────
/// Guest register commands address `PERIPHERAL_BASE + reg`.
pub const PERIPHERAL_BASE: u32 = 0x1000_0000;

// ── Interrupt controller ─────────────────────────────────────────────
pub const IRQ_IE: usize = 0x1000_1000;
pub const IRQ_IF: usize = 0x1000_1004;
pub const IRQ_LINES: u32 = 32;

// ── PXI (inter-processor word FIFO) ──────────────────────────────────
pub const PXI_SYNC: usize = 0x1000_8000;
pub const PXI_CNT: usize = 0x1000_8004;
pub const PXI_SEND: usize = 0x1000_8008;
pub const PXI_RECV: usize = 0x1000_800C;

pub const IRQ_PXI_SYNC: u32 = 12;
pub const IRQ_PXI_TX: u32 = 13;
pub const IRQ_PXI_RX: u32 = 14;

// ── Bootrom routines (cache maintenance, delay) ──────────────────────
pub const BFN_WAITCYCLES: usize = 0xFFFF_0198;
pub const BFN_INVALIDATE_DCACHE_RANGE: usize = 0xFFFF_0868;
pub const BFN_WRITEBACK_DCACHE_RANGE: usize = 0xFFFF_0830;

// ── Shared memory with the guest ─────────────────────────────────────
/// Disk image placed in FCRAM by the loader.
pub const DISK_IMAGE_BASE: usize = 0x2600_0000;
pub const DISK_IMAGE_SIZE: usize = 0x0200_0000; // 32MB

/// Split virtqueue for the block device (descriptor table first).
pub const BLK_VIRTQ_BASE: usize = 0x2800_0000;
pub const BLK_VIRTQ_SIZE: u16 = 128;

// ── Logging ──────────────────────────────────────────────────────────
pub const LOG_RING_SIZE: usize = 0x1000;
