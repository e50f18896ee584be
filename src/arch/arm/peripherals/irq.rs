//! ARM9 interrupt controller
//!
//! Two registers: IE (enable, one bit per line) and IF (pending; write 1 to
//! acknowledge). Handlers live in a 32-entry table consulted from the IRQ
//! vector.

use core::cell::Cell;

use super::{read_reg, write_reg};
use crate::arch::arm::Arm946;
use crate::critical::{self, CriticalSection};
use crate::platform::{IRQ_IE, IRQ_IF, IRQ_LINES};
use crate::sync::CsMutex;
use crate::virq::{IrqChip, IrqHandler};

static HANDLERS: CsMutex<[Cell<Option<IrqHandler>>; IRQ_LINES as usize]> =
    CsMutex::new([const { Cell::new(None) }; IRQ_LINES as usize]);

/// Handle to the (single) interrupt controller.
#[derive(Clone, Copy, Default)]
pub struct Arm9Irq;

impl Arm9Irq {
    /// Disable and acknowledge every line and forget all handlers.
    pub fn reset(&mut self) {
        critical::with(&Arm946, |cs| {
            write_reg(IRQ_IE, 0);
            write_reg(IRQ_IF, !0);
            for slot in HANDLERS.borrow(cs) {
                slot.set(None);
            }
        });
    }

    /// IRQ vector body: acknowledge and run the handler of every pending
    /// enabled line, lowest line first.
    pub fn dispatch(&self, cs: &CriticalSection<'_>) {
        let mut pending = read_reg(IRQ_IF) & read_reg(IRQ_IE);
        while pending != 0 {
            let line = pending.trailing_zeros();
            pending &= pending - 1;

            write_reg(IRQ_IF, 1 << line);
            if let Some(handler) = HANDLERS.borrow(cs)[line as usize].get() {
                handler(line);
            }
        }
    }
}

impl IrqChip for Arm9Irq {
    fn enable(&mut self, line: u32, handler: Option<IrqHandler>) {
        if line >= IRQ_LINES {
            return;
        }
        critical::with(&Arm946, |cs| {
            HANDLERS.borrow(cs)[line as usize].set(handler);
            // Drop a stale fire from before the line was enabled.
            write_reg(IRQ_IF, 1 << line);
            write_reg(IRQ_IE, read_reg(IRQ_IE) | 1 << line);
        });
    }

    fn disable(&mut self, line: u32) {
        if line >= IRQ_LINES {
            return;
        }
        critical::with(&Arm946, |cs| {
            write_reg(IRQ_IE, read_reg(IRQ_IE) & !(1 << line));
            HANDLERS.borrow(cs)[line as usize].set(None);
        });
    }
}
