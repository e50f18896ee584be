//! RAM ring log sink for the `log` facade.
//!
//! There is no console on this processor, so log lines go into a fixed ring
//! buffer that a debugger (or the guest, through shared memory) can read.
//! Each record is formatted as `[LEVEL target] message`.

use core::cell::RefCell;
use core::fmt::{self, Write};

use log::{Level, LevelFilter, Metadata, Record};

use crate::arch::Cpu;
use crate::critical;
use crate::platform::LOG_RING_SIZE;
use crate::sync::CsMutex;

/// Fixed-size byte ring; the oldest bytes are overwritten first.
pub struct LogRing {
    buf: [u8; LOG_RING_SIZE],
    /// Next byte to write
    head: usize,
    wrapped: bool,
}

impl LogRing {
    pub const fn new() -> Self {
        Self {
            buf: [0; LOG_RING_SIZE],
            head: 0,
            wrapped: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.buf[self.head] = b;
            self.head += 1;
            if self.head == LOG_RING_SIZE {
                self.head = 0;
                self.wrapped = true;
            }
        }
    }

    /// Bytes currently held.
    pub fn len(&self) -> usize {
        if self.wrapped {
            LOG_RING_SIZE
        } else {
            self.head
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the newest bytes in order, oldest first. Returns the count.
    pub fn read_into(&self, out: &mut [u8]) -> usize {
        let n = self.len().min(out.len());
        let start = (self.head + LOG_RING_SIZE - n) % LOG_RING_SIZE;
        for (i, slot) in out[..n].iter_mut().enumerate() {
            *slot = self.buf[(start + i) % LOG_RING_SIZE];
        }
        n
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.wrapped = false;
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LogRing {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        Ok(())
    }
}

/// `log::Log` implementation writing into a [`LogRing`].
///
/// Records may come from interrupt context, so the ring is only touched
/// with interrupts masked.
pub struct RingLogger<C> {
    cpu: C,
    level: LevelFilter,
    ring: CsMutex<RefCell<LogRing>>,
}

impl<C: Cpu> RingLogger<C> {
    pub const fn new(cpu: C, level: LevelFilter) -> Self {
        Self {
            cpu,
            level,
            ring: CsMutex::new(RefCell::new(LogRing::new())),
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Run `f` on the ring inside a critical section. A nested call (a log
    /// line emitted while formatting another) is dropped.
    pub fn with_ring<R>(&self, f: impl FnOnce(&mut LogRing) -> R) -> Option<R> {
        critical::with(&self.cpu, |cs| {
            let mut ring = self.ring.borrow(cs).try_borrow_mut().ok()?;
            Some(f(&mut ring))
        })
    }

    pub fn write_record(&self, level: Level, target: &str, args: fmt::Arguments<'_>) {
        self.with_ring(|ring| {
            let _ = writeln!(ring, "[{level:<5} {target}] {args}");
        });
    }

    /// Raw text, no record framing.
    pub fn write_fmt_raw(&self, args: fmt::Arguments<'_>) {
        self.with_ring(|ring| {
            let _ = ring.write_fmt(args);
        });
    }

    pub fn read_into(&self, out: &mut [u8]) -> usize {
        self.with_ring(|ring| ring.read_into(out)).unwrap_or(0)
    }
}

impl<C: Cpu + Send + Sync> log::Log for RingLogger<C> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.write_record(record.level(), record.target(), *record.args());
        }
    }

    fn flush(&self) {}
}

#[cfg(target_arch = "arm")]
mod global {
    use super::*;
    use crate::arch::arm::Arm946;

    #[cfg(feature = "trace-log")]
    const LEVEL: LevelFilter = LevelFilter::Trace;
    #[cfg(not(feature = "trace-log"))]
    const LEVEL: LevelFilter = LevelFilter::Info;

    pub static LOGGER: RingLogger<Arm946> = RingLogger::new(Arm946, LEVEL);

    /// Install [`LOGGER`] as the `log` backend.
    ///
    /// ARMv5 has no compare-and-swap, so the racy setters are used; call
    /// once at boot with interrupts masked.
    pub fn init() {
        unsafe {
            if log::set_logger_racy(&LOGGER).is_ok() {
                log::set_max_level_racy(LEVEL);
            }
        }
    }

    /// Writer for the [`print!`](crate::print) macros.
    pub fn writer() -> RingWriter {
        RingWriter
    }

    pub struct RingWriter;

    impl fmt::Write for RingWriter {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            LOGGER.with_ring(|ring| ring.push(s.as_bytes()));
            Ok(())
        }
    }
}

#[cfg(target_arch = "arm")]
pub use global::{init, writer, RingWriter, LOGGER};

/// Print macro (without newline), into the log ring.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::logger::writer(), $($arg)*);
    }};
}

/// Println macro (with newline), into the log ring.
#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = writeln!($crate::logger::writer(), $($arg)*);
    }};
}
