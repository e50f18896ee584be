//! Virtio block device backend.
//!
//! Turns guest descriptor chains into physical sector transfers. A request
//! is a header descriptor followed by data descriptors of whole sectors and
//! a trailing one-byte status descriptor. Data moves straight between the
//! storage driver and the guest buffers; the data cache is cleaned or
//! invalidated around each transfer because the guest processor does not
//! snoop our cache.

use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::{DeviceError, HostEvent, HostNotifier, Job, JobQueue, VirtioDevice, VIRTIO_ID_BLOCK};
use crate::arch::Cpu;
use crate::storage::{BlockStorage, SECTOR_SIZE};

#[allow(non_camel_case_types)]
mod packed_nums {
    pub type u16_le = zerocopy::U16<zerocopy::LittleEndian>;
    pub type u32_le = zerocopy::U32<zerocopy::LittleEndian>;
    pub type u64_le = zerocopy::U64<zerocopy::LittleEndian>;
}
use packed_nums::*;

// ── Virtio-blk request types ────────────────────────────────────────
pub const VIRTIO_BLK_T_IN: u32 = 0; // Read from disk
pub const VIRTIO_BLK_T_OUT: u32 = 1; // Write to disk
pub const VIRTIO_BLK_T_FLUSH: u32 = 4;

// ── Virtio-blk status codes ────────────────────────────────────────
pub const VIRTIO_BLK_S_OK: u8 = 0;
pub const VIRTIO_BLK_S_IOERR: u8 = 1;
pub const VIRTIO_BLK_S_UNSUPP: u8 = 2;

// ── Virtio-blk feature bits ────────────────────────────────────────
pub const VIRTIO_BLK_F_SIZE_MAX: u64 = 1 << 1;
pub const VIRTIO_BLK_F_SEG_MAX: u64 = 1 << 2;
pub const VIRTIO_BLK_F_BLK_SIZE: u64 = 1 << 6;
pub const VIRTIO_BLK_F_FLUSH: u64 = 1 << 9;

#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct BlkGeometry {
    pub cylinders: u16_le,
    pub heads: u8,
    pub sectors: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct BlkTopology {
    /// Logical blocks per physical block (log2)
    pub physical_block_exp: u8,
    /// Offset of first aligned logical block
    pub alignment_offset: u8,
    /// Suggested minimum I/O size in blocks
    pub min_io_size: u16_le,
    /// Optimal I/O size in blocks
    pub opt_io_size: u32_le,
}

/// Device config space as the guest reads it (little-endian, no padding).
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct BlkConfig {
    /// Capacity in 512-byte sectors
    pub capacity: u64_le,
    pub size_max: u32_le,
    pub seg_max: u32_le,
    pub geometry: BlkGeometry,
    pub blk_size: u32_le,
    pub topology: BlkTopology,
    pub writeback: u8,
    pub unused0: [u8; 3],
    pub max_discard_sectors: u32_le,
    pub max_discard_seg: u32_le,
    pub discard_sector_alignment: u32_le,
    pub max_write_zeroes_sectors: u32_le,
    pub max_write_zeroes_seg: u32_le,
    pub write_zeroes_may_unmap: u8,
    pub unused1: [u8; 3],
}

const_assert_eq!(core::mem::size_of::<BlkConfig>(), 60);

/// Request header, first descriptor of every chain.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct BlkReqHeader {
    pub request_type: u32_le,
    pub reserved: u32_le,
    /// Starting sector (512-byte units)
    pub sector: u64_le,
}

const_assert_eq!(core::mem::size_of::<BlkReqHeader>(), 16);

impl BlkReqHeader {
    pub fn new(request_type: u32, sector: u64) -> Self {
        Self {
            request_type: request_type.into(),
            reserved: 0u32.into(),
            sector: sector.into(),
        }
    }

    /// Decode from the head descriptor's bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, DeviceError> {
        Self::read_from_prefix(bytes)
            .map(|(header, _)| header)
            .map_err(|_| DeviceError::ShortHeader { len: bytes.len() })
    }
}

/// What a data descriptor of a given length is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Sectors(u32),
    Status,
}

fn classify(len: usize) -> Result<Segment, DeviceError> {
    if len != 0 && len % SECTOR_SIZE == 0 {
        Ok(Segment::Sectors((len / SECTOR_SIZE) as u32))
    } else if len % SECTOR_SIZE == 1 {
        Ok(Segment::Status)
    } else {
        Err(DeviceError::BadDescriptorLength { len })
    }
}

/// Virtio-blk device over a physical storage driver.
pub struct VirtioBlk<S, H> {
    storage: S,
    cpu: H,
    config: BlkConfig,
}

impl<S: BlockStorage, H: Cpu> VirtioBlk<S, H> {
    /// Create the device. Config space stays zeroed until [`VirtioDevice::hard_reset`].
    pub fn new(storage: S, cpu: H) -> Self {
        Self {
            storage,
            cpu,
            config: BlkConfig::new_zeroed(),
        }
    }

    pub fn config(&self) -> &BlkConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Run one request; the job is left on its last descriptor.
    fn process_request<Q: JobQueue>(&mut self, queue: &mut Q, job: &mut Job) -> Result<(), DeviceError> {
        let header_buf = queue.job_desc(job);
        self.cpu.dcache_invalidate_range(header_buf.as_ptr() as usize, header_buf.len());
        let header = BlkReqHeader::parse(header_buf)?;

        let request_type = header.request_type.get();
        // None once the running offset has run past the sector space.
        let mut sector = Some(header.sector.get());
        let mut status = VIRTIO_BLK_S_OK;

        match request_type {
            VIRTIO_BLK_T_IN | VIRTIO_BLK_T_OUT => {}
            VIRTIO_BLK_T_FLUSH => {
                if let Err(err) = self.storage.flush() {
                    log::warn!("vblk: flush failed: {err}");
                    status |= VIRTIO_BLK_S_IOERR;
                }
            }
            other => {
                log::debug!("vblk: unsupported request type {other}");
                return self.finish_unsupported(queue, job);
            }
        }

        while queue.fetch_job_next(job) {
            let buf = queue.job_desc(job);
            let len = buf.len();
            let addr = buf.as_ptr() as usize;

            match classify(len) {
                Ok(Segment::Sectors(count)) => {
                    let Some(start) = sector else {
                        continue;
                    };
                    sector = start.checked_add(count as u64);
                    if sector.is_none() {
                        log::warn!("vblk: sector {start} x{count} overflows, skipping rest of request");
                        status |= VIRTIO_BLK_S_IOERR;
                        continue;
                    }
                    let result = match request_type {
                        VIRTIO_BLK_T_IN => {
                            let result = self.storage.read_sectors(start, count, buf);
                            self.cpu.dcache_writeback_range(addr, len);
                            job.add_written(len as u32);
                            result
                        }
                        VIRTIO_BLK_T_OUT => {
                            self.cpu.dcache_invalidate_range(addr, len);
                            self.storage.write_sectors(start, count, buf)
                        }
                        // FLUSH carries no data; nothing to move.
                        _ => Ok(()),
                    };
                    if let Err(err) = result {
                        log::warn!("vblk: type {request_type} sector {start} x{count}: {err}");
                        status |= VIRTIO_BLK_S_IOERR;
                    }
                }
                Ok(Segment::Status) => {
                    buf[0] = status;
                    self.cpu.dcache_writeback_range(addr, 1);
                }
                Err(err) => {
                    log::error!("vblk: head {}: {err}", job.head());
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Skip the data of a request we do not implement; report UNSUPP.
    fn finish_unsupported<Q: JobQueue>(&mut self, queue: &mut Q, job: &mut Job) -> Result<(), DeviceError> {
        while queue.fetch_job_next(job) {
            let buf = queue.job_desc(job);
            if buf.len() % SECTOR_SIZE == 1 {
                buf[0] = VIRTIO_BLK_S_UNSUPP;
                self.cpu.dcache_writeback_range(buf.as_ptr() as usize, 1);
            }
        }
        Ok(())
    }
}

impl<S: BlockStorage, H: Cpu> VirtioDevice for VirtioBlk<S, H> {
    fn device_id(&self) -> u32 {
        VIRTIO_ID_BLOCK
    }

    fn device_features(&self) -> u64 {
        let mut features = VIRTIO_BLK_F_BLK_SIZE | VIRTIO_BLK_F_FLUSH;
        if self.config.size_max.get() != 0 {
            features |= VIRTIO_BLK_F_SIZE_MAX;
        }
        if self.config.seg_max.get() != 0 {
            features |= VIRTIO_BLK_F_SEG_MAX;
        }
        features
    }

    fn hard_reset(&mut self) {
        self.config = BlkConfig::new_zeroed();

        if let Err(err) = self.storage.init() {
            log::error!("vblk: storage init failed: {err}");
            return;
        }

        let limits = self.storage.limits();
        self.config.capacity = self.storage.capacity().into();
        self.config.blk_size = (SECTOR_SIZE as u32).into();
        self.config.size_max = limits.size_max.into();
        self.config.seg_max = limits.seg_max.into();
        log::info!("vblk: {} sectors", self.config.capacity.get());
    }

    fn config_read(&self, offset: usize) -> u8 {
        self.config.as_bytes().get(offset).copied().unwrap_or(0xFF)
    }

    fn process_queue<Q: JobQueue>(
        &mut self,
        queue: &mut Q,
        host: &mut dyn HostNotifier,
    ) -> Result<(), DeviceError> {
        while let Some(mut job) = queue.fetch_job_new() {
            self.process_request(queue, &mut job)?;
            queue.push_job(job);
            host.notify_host(HostEvent::QueueUsed);
        }
        Ok(())
    }
}
