//! Virtio device framework.
//!
//! Devices consume requests through the [`JobQueue`] interface (one job per
//! guest descriptor chain) and report completions through [`HostNotifier`].
//! [`queue::Virtqueue`] implements the queue side over a split ring in
//! memory shared with the guest.

pub mod blk;
pub mod queue;

use thiserror::Error;

/// Virtio device IDs
pub const VIRTIO_ID_BLOCK: u32 = 2;

/// Guest request protocol violations. Fatal: the firmware halts rather than
/// risk a partial transfer into storage or guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("request header descriptor is {len} bytes")]
    ShortHeader { len: usize },
    #[error("descriptor length {len} is neither whole sectors nor a status byte")]
    BadDescriptorLength { len: usize },
}

/// One in-flight guest request (a descriptor chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    head: u16,
    cursor: u16,
    hops: u16,
    written: u32,
}

impl Job {
    /// A job positioned on its head descriptor.
    pub fn new(head: u16) -> Self {
        Self {
            head,
            cursor: head,
            hops: 0,
            written: 0,
        }
    }

    pub fn head(&self) -> u16 {
        self.head
    }

    /// Index of the current descriptor.
    pub fn cursor(&self) -> u16 {
        self.cursor
    }

    /// Descriptors stepped past the head.
    pub fn hops(&self) -> u16 {
        self.hops
    }

    /// Move to the next descriptor of the chain.
    pub fn advance(&mut self, next: u16) {
        self.cursor = next;
        self.hops += 1;
    }

    /// Record bytes the device wrote into guest buffers.
    pub fn add_written(&mut self, bytes: u32) {
        self.written += bytes;
    }

    pub fn written(&self) -> u32 {
        self.written
    }
}

/// Descriptor-queue side of the device-manager framework.
pub trait JobQueue {
    /// Take the next request posted by the guest.
    fn fetch_job_new(&mut self) -> Option<Job>;

    /// Step `job` to its next descriptor; false at the end of the chain.
    fn fetch_job_next(&mut self, job: &mut Job) -> bool;

    /// Buffer of the job's current descriptor.
    fn job_desc(&mut self, job: &Job) -> &mut [u8];

    /// Hand a finished job back to the guest.
    fn push_job(&mut self, job: Job);
}

/// Events reported to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Completed jobs were pushed to a queue.
    QueueUsed,
    /// Config space was rebuilt.
    ConfigChanged,
}

pub trait HostNotifier {
    fn notify_host(&mut self, event: HostEvent);
}

/// Device backend interface driven by the device manager.
pub trait VirtioDevice {
    fn device_id(&self) -> u32;

    fn device_features(&self) -> u64;

    /// Device or bus reset: rebuild config space and reinitialize hardware.
    fn hard_reset(&mut self);

    /// One byte of config space, `0xFF` past the end. Config space is
    /// read-only to the guest.
    fn config_read(&self, offset: usize) -> u8;

    /// Service every job posted on `queue`.
    ///
    /// Not reentrant: the caller never runs two calls on one queue at once.
    fn process_queue<Q: JobQueue>(
        &mut self,
        queue: &mut Q,
        host: &mut dyn HostNotifier,
    ) -> Result<(), DeviceError>;
}
