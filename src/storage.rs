//! Physical block storage.
//!
//! Sector addressed, 512 bytes per sector. The block backend only sees the
//! [`BlockStorage`] trait; [`RamDisk`] serves a disk image already placed in
//! memory by the loader.

use thiserror::Error;

pub const SECTOR_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("sectors {sector}..+{count} beyond capacity {capacity}")]
    OutOfRange { sector: u64, count: u32, capacity: u64 },
    #[error("buffer of {len} bytes cannot hold {count} sectors")]
    ShortBuffer { len: usize, count: u32 },
    #[error("storage not initialized")]
    NotReady,
}

/// Transfer limits advertised to the guest; zero means "no limit reported".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    /// Largest single segment in bytes.
    pub size_max: u32,
    /// Most data segments per request.
    pub seg_max: u32,
}

pub trait BlockStorage {
    fn init(&mut self) -> Result<(), StorageError>;

    /// Capacity in sectors.
    fn capacity(&self) -> u64;

    fn read_sectors(&mut self, sector: u64, count: u32, buf: &mut [u8]) -> Result<(), StorageError>;

    fn write_sectors(&mut self, sector: u64, count: u32, buf: &[u8]) -> Result<(), StorageError>;

    /// Make previous writes durable.
    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn limits(&self) -> TransferLimits {
        TransferLimits::default()
    }
}

/// Disk image resident in memory.
pub struct RamDisk {
    image: &'static mut [u8],
    ready: bool,
}

impl RamDisk {
    /// Wrap an image; a trailing partial sector is not addressable.
    pub fn new(image: &'static mut [u8]) -> Self {
        Self { image, ready: false }
    }

    /// Byte range covered by a request, checked against the image.
    fn span(&self, sector: u64, count: u32, len: usize) -> Result<core::ops::Range<usize>, StorageError> {
        if !self.ready {
            return Err(StorageError::NotReady);
        }
        let bytes = count as usize * SECTOR_SIZE;
        if len < bytes {
            return Err(StorageError::ShortBuffer { len, count });
        }
        let capacity = self.capacity();
        if sector.checked_add(count as u64).map_or(true, |end| end > capacity) {
            return Err(StorageError::OutOfRange { sector, count, capacity });
        }
        let start = sector as usize * SECTOR_SIZE;
        Ok(start..start + bytes)
    }
}

impl BlockStorage for RamDisk {
    fn init(&mut self) -> Result<(), StorageError> {
        self.ready = true;
        Ok(())
    }

    fn capacity(&self) -> u64 {
        (self.image.len() / SECTOR_SIZE) as u64
    }

    fn read_sectors(&mut self, sector: u64, count: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let range = self.span(sector, count, buf.len())?;
        let len = range.len();
        buf[..len].copy_from_slice(&self.image[range]);
        Ok(())
    }

    fn write_sectors(&mut self, sector: u64, count: u32, buf: &[u8]) -> Result<(), StorageError> {
        let range = self.span(sector, count, buf.len())?;
        let len = range.len();
        self.image[range].copy_from_slice(&buf[..len]);
        Ok(())
    }

    fn limits(&self) -> TransferLimits {
        TransferLimits {
            size_max: 0x0002_0000, // 128KB
            seg_max: 126,
        }
    }
}
