//! Host-side doubles for the hardware seams, used by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

use crate::arch::Cpu;
use crate::devices::virtio::{HostEvent, HostNotifier, Job, JobQueue};
use crate::mmio::{RegisterBus, Width};
use crate::storage::{BlockStorage, StorageError, TransferLimits, SECTOR_SIZE};
use crate::transport::{SyncSignal, Transport};
use crate::virq::{IrqChip, IrqHandler, VIRQ_LINES};

/// Supervisor mode, interrupts enabled.
const RESET_CPSR: u32 = 0x13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Writeback(usize),
    Invalidate(usize),
}

/// Processor with a status register and a log of cache maintenance.
pub struct SimCpu {
    cpsr: Cell<u32>,
    wfi: Cell<u32>,
    wfi_hook: Cell<Option<(u32, fn())>>,
    cache: RefCell<Vec<CacheOp>>,
}

impl SimCpu {
    pub fn new() -> Self {
        Self {
            cpsr: Cell::new(RESET_CPSR),
            wfi: Cell::new(0),
            wfi_hook: Cell::new(None),
            cache: RefCell::new(Vec::new()),
        }
    }

    pub fn wfi_count(&self) -> u32 {
        self.wfi.get()
    }

    /// Run `hook` during the `n`th wait-for-interrupt, standing in for an
    /// interrupt that arrives while asleep.
    pub fn on_wfi(&self, n: u32, hook: fn()) {
        self.wfi_hook.set(Some((n, hook)));
    }

    pub fn cache_ops(&self) -> Vec<CacheOp> {
        self.cache.borrow().clone()
    }
}

impl Cpu for SimCpu {
    fn status(&self) -> u32 {
        self.cpsr.get()
    }

    fn set_status_control(&self, value: u32) {
        // Only the control field (low byte) is written.
        self.cpsr.set((self.cpsr.get() & !0xFF) | (value & 0xFF));
    }

    fn data_sync_barrier(&self) {}

    fn dcache_writeback_range(&self, _addr: usize, len: usize) {
        self.cache.borrow_mut().push(CacheOp::Writeback(len));
    }

    fn dcache_invalidate_range(&self, _addr: usize, len: usize) {
        self.cache.borrow_mut().push(CacheOp::Invalidate(len));
    }

    fn delay_cycles(&self, _cycles: u32) {}

    fn wait_for_interrupt(&self) {
        let count = self.wfi.get() + 1;
        self.wfi.set(count);
        if let Some((n, hook)) = self.wfi_hook.get() {
            if n == count {
                hook();
            }
        }
    }
}

/// Sparse byte-addressed register file; unwritten bytes read as zero.
#[derive(Default)]
pub struct SimRegisters {
    bytes: BTreeMap<u32, u8>,
    writes: usize,
}

impl SimRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Little-endian value of `nbytes` bytes at `addr`, bypassing the counters.
    pub fn peek(&self, addr: u32, nbytes: usize) -> u32 {
        (0..nbytes).fold(0, |acc, i| {
            let byte = self.bytes.get(&(addr + i as u32)).copied().unwrap_or(0);
            acc | (byte as u32) << (8 * i)
        })
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl RegisterBus for SimRegisters {
    fn read(&mut self, addr: u32, width: Width) -> u32 {
        self.peek(addr, width.bytes())
    }

    fn write(&mut self, addr: u32, width: Width, value: u32) {
        self.writes += 1;
        for i in 0..width.bytes() {
            self.bytes.insert(addr + i as u32, (value >> (8 * i)) as u8);
        }
    }
}

/// Word FIFO pair plus a sync counter.
#[derive(Default)]
pub struct SimTransport {
    rx: VecDeque<u32>,
    tx: Vec<u32>,
    syncs: Cell<u32>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue words as if the guest had sent them.
    pub fn push_rx(&mut self, words: &[u32]) {
        self.rx.extend(words.iter().copied());
    }

    pub fn sent(&self) -> &[u32] {
        &self.tx
    }

    pub fn take_sent(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.tx)
    }

    pub fn sync_count(&self) -> u32 {
        self.syncs.get()
    }
}

impl Transport for SimTransport {
    fn is_rx_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn recv(&mut self) -> u32 {
        // A real transport would block forever here.
        self.rx.pop_front().expect("recv on an empty FIFO would block")
    }

    fn send(&mut self, word: u32) {
        self.tx.push(word);
    }
}

impl SyncSignal for SimTransport {
    fn trigger(&self) {
        self.syncs.set(self.syncs.get() + 1);
    }
}

pub fn noop_handler(_line: u32) {}

/// Interrupt controller that only records enable state.
pub struct SimIrqChip {
    enabled: u32,
    handlers: [Option<IrqHandler>; VIRQ_LINES as usize],
}

impl SimIrqChip {
    pub fn new() -> Self {
        Self {
            enabled: 0,
            handlers: [None; VIRQ_LINES as usize],
        }
    }

    pub fn is_enabled(&self, line: u32) -> bool {
        self.enabled & (1 << line) != 0
    }

    pub fn handler(&self, line: u32) -> Option<IrqHandler> {
        self.handlers[line as usize]
    }
}

impl IrqChip for SimIrqChip {
    fn enable(&mut self, line: u32, handler: Option<IrqHandler>) {
        self.enabled |= 1 << line;
        self.handlers[line as usize] = handler;
    }

    fn disable(&mut self, line: u32) {
        self.enabled &= !(1 << line);
        self.handlers[line as usize] = None;
    }
}

/// A posted descriptor chain and its completion.
pub struct SimChain {
    pub buffers: Vec<Vec<u8>>,
    pub written: u32,
    done: bool,
}

/// Job queue over owned buffers. Descriptor indices are allocated
/// consecutively per chain, so a chain's head is its first index.
#[derive(Default)]
pub struct SimQueue {
    chains: Vec<SimChain>,
    /// Descriptor index -> (chain, position in chain)
    descs: Vec<(usize, usize)>,
    avail: VecDeque<u16>,
}

impl SimQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a chain; returns its head index.
    pub fn post(&mut self, buffers: Vec<Vec<u8>>) -> u16 {
        let head = self.descs.len() as u16;
        let chain = self.chains.len();
        self.descs.extend((0..buffers.len()).map(|pos| (chain, pos)));
        self.chains.push(SimChain {
            buffers,
            written: 0,
            done: false,
        });
        self.avail.push_back(head);
        head
    }

    fn chain_of(&self, head: u16) -> usize {
        self.descs[head as usize].0
    }

    pub fn is_completed(&self, head: u16) -> bool {
        self.chains[self.chain_of(head)].done
    }

    pub fn completed(&self, head: u16) -> &SimChain {
        let chain = &self.chains[self.chain_of(head)];
        assert!(chain.done, "chain {head} was not completed");
        chain
    }
}

impl JobQueue for SimQueue {
    fn fetch_job_new(&mut self) -> Option<Job> {
        self.avail.pop_front().map(Job::new)
    }

    fn fetch_job_next(&mut self, job: &mut Job) -> bool {
        let (chain, pos) = self.descs[job.cursor() as usize];
        if pos + 1 < self.chains[chain].buffers.len() {
            job.advance(job.cursor() + 1);
            true
        } else {
            false
        }
    }

    fn job_desc(&mut self, job: &Job) -> &mut [u8] {
        let (chain, pos) = self.descs[job.cursor() as usize];
        &mut self.chains[chain].buffers[pos]
    }

    fn push_job(&mut self, job: Job) {
        let chain = self.chain_of(job.head());
        self.chains[chain].written = job.written();
        self.chains[chain].done = true;
    }
}

/// Sector array with failure injection and operation counters.
pub struct SimStorage {
    data: Vec<u8>,
    limits: TransferLimits,
    initialized: bool,
    fail_init: bool,
    fail_io: bool,
    reads: usize,
    writes: usize,
    flushes: usize,
}

impl SimStorage {
    pub fn new(sectors: u64) -> Self {
        Self {
            data: vec![0; sectors as usize * SECTOR_SIZE],
            limits: TransferLimits::default(),
            initialized: false,
            fail_init: false,
            fail_io: false,
            reads: 0,
            writes: 0,
            flushes: 0,
        }
    }

    pub fn set_limits(&mut self, size_max: u32, seg_max: u32) {
        self.limits = TransferLimits { size_max, seg_max };
    }

    pub fn fail_init(&mut self, fail: bool) {
        self.fail_init = fail;
    }

    pub fn fail_io(&mut self, fail: bool) {
        self.fail_io = fail;
    }

    /// Give every byte a value derived from its offset.
    pub fn fill_pattern(&mut self) {
        for (i, b) in self.data.iter_mut().enumerate() {
            *b = (i / SECTOR_SIZE) as u8 ^ (i % 253) as u8;
        }
    }

    pub fn sectors(&self, sector: u64, count: u32) -> Vec<u8> {
        let start = sector as usize * SECTOR_SIZE;
        self.data[start..start + count as usize * SECTOR_SIZE].to_vec()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    fn span(&self, sector: u64, count: u32) -> Result<std::ops::Range<usize>, StorageError> {
        if self.fail_io {
            return Err(StorageError::NotReady);
        }
        let capacity = self.capacity();
        if sector.checked_add(count as u64).map_or(true, |end| end > capacity) {
            return Err(StorageError::OutOfRange { sector, count, capacity });
        }
        let start = sector as usize * SECTOR_SIZE;
        Ok(start..start + count as usize * SECTOR_SIZE)
    }
}

impl BlockStorage for SimStorage {
    fn init(&mut self) -> Result<(), StorageError> {
        if self.fail_init {
            self.initialized = false;
            return Err(StorageError::NotReady);
        }
        self.initialized = true;
        Ok(())
    }

    fn capacity(&self) -> u64 {
        (self.data.len() / SECTOR_SIZE) as u64
    }

    fn read_sectors(&mut self, sector: u64, count: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        self.reads += 1;
        let range = self.span(sector, count)?;
        let len = range.len();
        buf[..len].copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sectors(&mut self, sector: u64, count: u32, buf: &[u8]) -> Result<(), StorageError> {
        self.writes += 1;
        let range = self.span(sector, count)?;
        let len = range.len();
        self.data[range].copy_from_slice(&buf[..len]);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.flushes += 1;
        Ok(())
    }

    fn limits(&self) -> TransferLimits {
        self.limits
    }
}

/// Host notifier that keeps every event.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Vec<HostEvent>,
}

impl HostNotifier for RecordingNotifier {
    fn notify_host(&mut self, event: HostEvent) {
        self.events.push(event);
    }
}
