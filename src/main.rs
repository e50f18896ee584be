#![no_std]
#![no_main]

use core::panic::PanicInfo;

use bridgefw::arch::arm::peripherals::{Arm9Irq, Pxi};
use bridgefw::arch::arm::Arm946;
use bridgefw::command::Dispatcher;
use bridgefw::critical;
use bridgefw::devices::virtio::blk::VirtioBlk;
use bridgefw::devices::virtio::queue::Virtqueue;
use bridgefw::devices::virtio::{HostEvent, HostNotifier};
use bridgefw::devices::{Device, DeviceManager};
use bridgefw::mmio::Mmio;
use bridgefw::platform::{
    BLK_VIRTQ_BASE, BLK_VIRTQ_SIZE, DISK_IMAGE_BASE, DISK_IMAGE_SIZE, IRQ_PXI_RX, IRQ_PXI_SYNC,
    IRQ_PXI_TX,
};
use bridgefw::storage::RamDisk;
use bridgefw::sync::Event;
use bridgefw::transport::SyncSignal;
use bridgefw::virq::{IrqChip, VirqController};
use bridgefw::{logger, println};

static CPU: Arm946 = Arm946;

/// Signalled whenever there may be work: FIFO traffic or a guest sync.
static WAKE: Event = Event::new();

static VIRQ: VirqController = VirqController::new(on_virq_fire);

fn on_virq_fire(line: u32) {
    critical::with(&CPU, |cs| VIRQ.fire(cs, line, &Pxi));
}

fn on_pxi_fifo(_line: u32) {
    WAKE.signal();
}

/// Completions and config changes are announced with a PXI sync.
struct PxiNotifier;

impl HostNotifier for PxiNotifier {
    fn notify_host(&mut self, event: HostEvent) {
        log::trace!("notify host: {event:?}");
        Pxi.trigger();
    }
}

/// Rust entry point called from boot.S, interrupts masked.
#[no_mangle]
pub extern "C" fn rust_main() -> ! {
    logger::init();
    log::info!("bridgefw starting");

    let mut irq = Arm9Irq;
    let mut pxi = Pxi;
    irq.reset();
    pxi.reset();
    critical::with(&CPU, |cs| VIRQ.reset(cs));

    // Loaded by the bootloader; nothing else touches this window.
    let image = unsafe { core::slice::from_raw_parts_mut(DISK_IMAGE_BASE as *mut u8, DISK_IMAGE_SIZE) };
    let mut devices: DeviceManager<RamDisk, Arm946> = DeviceManager::new();
    let blk = VirtioBlk::new(RamDisk::new(image), CPU);
    if devices
        .register(Device::Blk(blk), Virtqueue::at(BLK_VIRTQ_BASE, BLK_VIRTQ_SIZE))
        .is_none()
    {
        panic!("no device slot for virtio-blk");
    }

    let mut host = PxiNotifier;
    devices.hard_reset_all(&mut host);

    // Also keeps these lines from interrupting the guest processor.
    irq.enable(IRQ_PXI_SYNC, Some(on_pxi_fifo));
    irq.enable(IRQ_PXI_TX, Some(on_pxi_fifo));
    irq.enable(IRQ_PXI_RX, Some(on_pxi_fifo));

    let mut dispatcher = Dispatcher::new(pxi, Mmio, irq, &VIRQ, &CPU);
    critical::interrupt_enable(&CPU);

    loop {
        WAKE.wait(&CPU);
        dispatcher.process();
        if let Err(err) = devices.poll(&mut host) {
            panic!("virtio: {err}");
        }
    }
}

/// Called from the IRQ vector in boot.S.
#[no_mangle]
pub extern "C" fn rust_irq_handler() {
    critical::with(&CPU, |cs| Arm9Irq.dispatch(cs));
}

/// Panic handler - required for no_std
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let _ = critical::enter(&CPU);
    println!("\n!!! PANIC !!!");
    println!("{}", info);

    loop {
        bridgefw::arch::Cpu::wait_for_interrupt(&CPU);
    }
}
