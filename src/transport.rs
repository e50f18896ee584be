//! Inter-processor word channel to the guest.
//!
//! Blocking operations have no timeout: the peer is trusted to keep the
//! FIFO moving.

/// 32-bit word FIFO shared with the guest.
pub trait Transport {
    /// Whether the receive FIFO is empty.
    fn is_rx_empty(&self) -> bool;

    /// Pop one word if available, without blocking.
    fn try_recv(&mut self) -> Option<u32> {
        if self.is_rx_empty() {
            None
        } else {
            Some(self.recv())
        }
    }

    /// Pop one word, waiting until one arrives.
    fn recv(&mut self) -> u32;

    /// Push one word, waiting while the send FIFO is full.
    fn send(&mut self, word: u32);
}

/// Out-of-band "something changed, go poll" signal to the guest.
///
/// Raised from interrupt context, so implementations must not block.
pub trait SyncSignal {
    fn trigger(&self);
}
