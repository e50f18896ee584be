//! Device Framework
//!
//! Owns the virtio backends exposed to the guest, each paired with the queue
//! its requests arrive on. Devices are registered into up to `MAX_DEVICES`
//! slots and dispatched through the [`Device`] enum.

pub mod virtio;

use virtio::blk::VirtioBlk;
use virtio::queue::Virtqueue;
use virtio::{DeviceError, HostEvent, HostNotifier, JobQueue, VirtioDevice};

use crate::arch::Cpu;
use crate::storage::BlockStorage;

// ── Enum dispatch ──────────────────────────────────────────────────

/// Device variant enum, one variant per supported device type.
pub enum Device<S, H> {
    Blk(VirtioBlk<S, H>),
}

impl<S: BlockStorage, H: Cpu> VirtioDevice for Device<S, H> {
    fn device_id(&self) -> u32 {
        match self {
            Device::Blk(d) => d.device_id(),
        }
    }

    fn device_features(&self) -> u64 {
        match self {
            Device::Blk(d) => d.device_features(),
        }
    }

    fn hard_reset(&mut self) {
        match self {
            Device::Blk(d) => d.hard_reset(),
        }
    }

    fn config_read(&self, offset: usize) -> u8 {
        match self {
            Device::Blk(d) => d.config_read(offset),
        }
    }

    fn process_queue<Q: JobQueue>(
        &mut self,
        queue: &mut Q,
        host: &mut dyn HostNotifier,
    ) -> Result<(), DeviceError> {
        match self {
            Device::Blk(d) => d.process_queue(queue, host),
        }
    }
}

// ── Device Manager ─────────────────────────────────────────────────

pub const MAX_DEVICES: usize = 8;

struct Slot<S, H, Q> {
    device: Device<S, H>,
    queue: Q,
}

/// Device manager: routes config reads and queue work to registered devices.
pub struct DeviceManager<S, H, Q = Virtqueue> {
    slots: [Option<Slot<S, H, Q>>; MAX_DEVICES],
    count: usize,
}

impl<S: BlockStorage, H: Cpu, Q: JobQueue> DeviceManager<S, H, Q> {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_DEVICES],
            count: 0,
        }
    }

    /// Register a device with its request queue. Returns slot index on success.
    pub fn register(&mut self, device: Device<S, H>, queue: Q) -> Option<usize> {
        if self.count >= MAX_DEVICES {
            log::warn!("devices: no free slot for device id {}", device.device_id());
            return None;
        }
        let idx = self.count;
        log::info!("devices: slot {idx} = device id {}", device.device_id());
        self.slots[idx] = Some(Slot { device, queue });
        self.count += 1;
        Some(idx)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn device(&self, slot: usize) -> Option<&Device<S, H>> {
        self.slots.get(slot)?.as_ref().map(|s| &s.device)
    }

    pub fn queue_mut(&mut self, slot: usize) -> Option<&mut Q> {
        self.slots.get_mut(slot)?.as_mut().map(|s| &mut s.queue)
    }

    /// Reset every device, then tell the guest config space changed.
    pub fn hard_reset_all(&mut self, host: &mut dyn HostNotifier) {
        for slot in self.slots.iter_mut().flatten() {
            slot.device.hard_reset();
        }
        host.notify_host(HostEvent::ConfigChanged);
    }

    /// Config space byte of the device in `slot`; `0xFF` for an empty slot.
    pub fn config_read(&self, slot: usize, offset: usize) -> u8 {
        self.device(slot).map_or(0xFF, |d| d.config_read(offset))
    }

    /// Service posted work on every queue. Stops at the first protocol
    /// violation; the caller treats that as fatal.
    pub fn poll(&mut self, host: &mut dyn HostNotifier) -> Result<(), DeviceError> {
        for slot in self.slots.iter_mut().flatten() {
            slot.device.process_queue(&mut slot.queue, host)?;
        }
        Ok(())
    }
}

impl<S: BlockStorage, H: Cpu, Q: JobQueue> Default for DeviceManager<S, H, Q> {
    fn default() -> Self {
        Self::new()
    }
}
