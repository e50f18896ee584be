//! Split virtqueue over guest-shared memory.
//!
//! The guest allocates the descriptor table, available ring and used ring in
//! memory both processors can reach at the same address, so the rings and
//! the buffers they describe are accessed directly through volatile pointers.

use core::sync::atomic::{fence, Ordering};

use super::{Job, JobQueue};

/// A single virtqueue descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtqDesc {
    /// Address of the buffer
    pub addr: u64,
    /// Length of the buffer in bytes
    pub len: u32,
    /// Descriptor flags (NEXT, WRITE, INDIRECT)
    pub flags: u16,
    /// Index of the next descriptor in the chain (if NEXT flag set)
    pub next: u16,
}

/// Descriptor flags
pub const VIRTQ_DESC_F_NEXT: u16 = 1;

/// Bytes before the ring array in both the available and used rings.
const RING_HEADER: usize = 4;

/// A single used ring element.
#[repr(C)]
#[derive(Clone, Copy)]
struct VirtqUsedElem {
    id: u32,
    len: u32,
}

/// Split virtqueue state.
pub struct Virtqueue {
    desc_addr: usize,
    avail_addr: usize,
    used_addr: usize,
    /// Queue size (number of descriptors, power of 2)
    num: u16,
    /// Next available ring slot to consume
    last_avail_idx: u16,
    ready: bool,
}

impl Virtqueue {
    pub const fn new() -> Self {
        Self {
            desc_addr: 0,
            avail_addr: 0,
            used_addr: 0,
            num: 0,
            last_avail_idx: 0,
            ready: false,
        }
    }

    /// Queue with the standard contiguous layout starting at `base`:
    /// descriptor table, available ring, then the used ring aligned to 4.
    pub fn at(base: usize, num: u16) -> Self {
        let (desc, avail, used) = Self::layout(base, num);
        let mut queue = Self::new();
        queue.setup(desc, avail, used, num);
        queue
    }

    /// Addresses of (descriptor table, available ring, used ring).
    pub fn layout(base: usize, num: u16) -> (usize, usize, usize) {
        let num = num as usize;
        let avail = base + num * core::mem::size_of::<VirtqDesc>();
        // flags + idx + ring[num] + used_event
        let avail_end = avail + RING_HEADER + 2 * num + 2;
        let used = (avail_end + 3) & !3;
        (base, avail, used)
    }

    pub fn setup(&mut self, desc: usize, avail: usize, used: usize, num: u16) {
        debug_assert!(num.is_power_of_two(), "queue size {num} is not a power of 2");
        self.desc_addr = desc;
        self.avail_addr = avail;
        self.used_addr = used;
        self.num = num;
        self.last_avail_idx = 0;
        self.ready = num != 0 && desc != 0 && avail != 0 && used != 0;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn size(&self) -> u16 {
        self.num
    }

    /// Reset the queue to initial state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn avail_idx(&self) -> u16 {
        // Available ring layout: flags (u16), idx (u16), ring[num] (u16)
        let idx = unsafe { core::ptr::read_volatile((self.avail_addr + 2) as *const u16) };
        fence(Ordering::Acquire);
        idx
    }

    /// Whether the guest posted chains we have not consumed.
    pub fn has_pending(&self) -> bool {
        self.ready && self.avail_idx() != self.last_avail_idx
    }

    fn desc(&self, idx: u16) -> Option<VirtqDesc> {
        if idx >= self.num {
            return None;
        }
        let base = self.desc_addr as *const VirtqDesc;
        Some(unsafe { core::ptr::read_volatile(base.add(idx as usize)) })
    }

    /// Put a used descriptor back into the used ring.
    ///
    /// `len` is the number of bytes written to device-writable descriptors.
    fn put_used(&mut self, head: u16, len: u32) {
        let idx_ptr = (self.used_addr + 2) as *mut u16;
        let elem_base = (self.used_addr + RING_HEADER) as *mut VirtqUsedElem;
        unsafe {
            let used_idx = core::ptr::read_volatile(idx_ptr);
            let slot = (used_idx % self.num) as usize;
            core::ptr::write_volatile(elem_base.add(slot), VirtqUsedElem { id: head as u32, len });

            // The element must be visible before the index that publishes it.
            fence(Ordering::Release);
            core::ptr::write_volatile(idx_ptr, used_idx.wrapping_add(1));
        }
    }
}

impl Default for Virtqueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for Virtqueue {
    fn fetch_job_new(&mut self) -> Option<Job> {
        if !self.has_pending() {
            return None;
        }

        let ring_base = (self.avail_addr + RING_HEADER) as *const u16;
        let slot = (self.last_avail_idx % self.num) as usize;
        let head = unsafe { core::ptr::read_volatile(ring_base.add(slot)) };
        self.last_avail_idx = self.last_avail_idx.wrapping_add(1);

        Some(Job::new(head))
    }

    fn fetch_job_next(&mut self, job: &mut Job) -> bool {
        let Some(desc) = self.desc(job.cursor()) else {
            return false;
        };
        if desc.flags & VIRTQ_DESC_F_NEXT == 0 {
            return false;
        }
        // A chain can never be longer than the table; stop on loops.
        if desc.next >= self.num || job.hops() + 1 >= self.num {
            log::warn!("virtq: malformed chain at head {}", job.head());
            return false;
        }
        job.advance(desc.next);
        true
    }

    fn job_desc(&mut self, job: &Job) -> &mut [u8] {
        match self.desc(job.cursor()) {
            // Buffers are trusted to be valid shared memory, as with the rings.
            Some(desc) if desc.addr != 0 => unsafe {
                core::slice::from_raw_parts_mut(desc.addr as usize as *mut u8, desc.len as usize)
            },
            _ => &mut [],
        }
    }

    fn push_job(&mut self, job: Job) {
        self.put_used(job.head(), job.written());
    }
}
