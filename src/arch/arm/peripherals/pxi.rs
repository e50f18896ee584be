//! PXI inter-processor FIFO (ARM9 side)
//!
//! Word FIFOs in both directions plus a sync register whose bit 29 raises
//! an interrupt on the other processor.

use super::{read_reg, write_reg};
use crate::platform::{PXI_CNT, PXI_RECV, PXI_SEND, PXI_SYNC};
use crate::transport::{SyncSignal, Transport};

// PXI_CNT bits
const CNT_SEND_FULL: u32 = 1 << 1;
const CNT_SEND_IRQ: u32 = 1 << 2;
const CNT_FLUSH_SEND: u32 = 1 << 3;
const CNT_RECV_EMPTY: u32 = 1 << 8;
const CNT_RECV_IRQ: u32 = 1 << 10;
const CNT_ERROR_ACK: u32 = 1 << 14;
const CNT_ENABLE: u32 = 1 << 15;

// PXI_SYNC bits
const SYNC_TRIGGER_REMOTE: u32 = 1 << 29;
const SYNC_IRQ_ENABLE: u32 = 1 << 31;

#[derive(Clone, Copy, Default)]
pub struct Pxi;

impl Pxi {
    /// Flush the send FIFO, drain the receive FIFO and enable the FIFO
    /// interrupts (send-empty, receive-not-empty) and the sync interrupt.
    pub fn reset(&mut self) {
        write_reg(PXI_SYNC, 0);
        write_reg(PXI_CNT, CNT_FLUSH_SEND | CNT_ERROR_ACK);
        while read_reg(PXI_CNT) & CNT_RECV_EMPTY == 0 {
            let _ = read_reg(PXI_RECV);
        }
        write_reg(PXI_CNT, CNT_ENABLE | CNT_SEND_IRQ | CNT_RECV_IRQ | CNT_ERROR_ACK);
        write_reg(PXI_SYNC, SYNC_IRQ_ENABLE);
    }
}

impl Transport for Pxi {
    fn is_rx_empty(&self) -> bool {
        read_reg(PXI_CNT) & CNT_RECV_EMPTY != 0
    }

    fn recv(&mut self) -> u32 {
        while self.is_rx_empty() {}
        read_reg(PXI_RECV)
    }

    fn send(&mut self, word: u32) {
        while read_reg(PXI_CNT) & CNT_SEND_FULL != 0 {}
        write_reg(PXI_SEND, word);
    }
}

impl SyncSignal for Pxi {
    fn trigger(&self) {
        write_reg(PXI_SYNC, read_reg(PXI_SYNC) | SYNC_TRIGGER_REMOTE);
    }
}
