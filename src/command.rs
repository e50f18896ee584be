//! Guest command decoding and dispatch.
//!
//! The guest drives registers and virtual interrupts by pushing 32-bit
//! command words into the transport:
//!
//! ```text
//!  31    28 27    24 23                                0
//! +--------+--------+-----------------------------------+
//! |  mode  |  size  |                reg                |
//! +--------+--------+-----------------------------------+
//! ```
//!
//! WRITE/IOSET/IOCLR are followed by one operand word; READ/IRQGET answer
//! with one reply word. The peer is privileged and trusted: unknown modes
//! are ignored and out-of-range widths degrade to a sentinel or a no-op.

use bitfield_struct::bitfield;

use crate::arch::Cpu;
use crate::critical;
use crate::mmio::{RegisterBus, Width};
use crate::platform::PERIPHERAL_BASE;
use crate::transport::Transport;
use crate::virq::{IrqChip, VirqController};

/// Reply to a READ with an unsupported width.
pub const BAD_READ: u32 = 0xDEAD_BEEF;

/// Virtual IRQ line selector within `reg`.
const LINE_MASK: u32 = 0x1F;

/// Raw command word as it arrives on the wire.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct CommandWord {
    #[bits(24)]
    pub reg: u32,
    #[bits(4)]
    pub size: u8,
    #[bits(4)]
    pub mode: u8,
}

impl CommandWord {
    pub fn encode(mode: u8, size: u8, reg: u32) -> Self {
        Self::new().with_mode(mode).with_size(size).with_reg(reg)
    }

    /// Absolute register address in the peripheral window.
    pub fn address(&self) -> u32 {
        PERIPHERAL_BASE + self.reg()
    }

    pub fn width(&self) -> Option<Width> {
        Width::from_code(self.size())
    }

    pub fn command_mode(&self) -> Option<CommandMode> {
        CommandMode::from_raw(self.mode())
    }
}

/// Operation selected by the `mode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandMode {
    Write = 0,
    Read = 1,
    IoSet = 2,
    IoClr = 3,
    IrqGet = 4,
    IrqMask = 5,
    IrqUnmask = 6,
}

impl CommandMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => CommandMode::Write,
            1 => CommandMode::Read,
            2 => CommandMode::IoSet,
            3 => CommandMode::IoClr,
            4 => CommandMode::IrqGet,
            5 => CommandMode::IrqMask,
            6 => CommandMode::IrqUnmask,
            _ => return None,
        })
    }

    /// Whether the `size` field selects a register width for this mode.
    pub fn is_register_access(self) -> bool {
        matches!(
            self,
            CommandMode::Write | CommandMode::Read | CommandMode::IoSet | CommandMode::IoClr
        )
    }
}

/// Executes guest commands one at a time.
///
/// The dispatch loop is the only consumer of the transport, so at most one
/// command is ever in flight.
pub struct Dispatcher<'a, T, B, C> {
    transport: T,
    bus: B,
    chip: C,
    virq: &'a VirqController,
    cpu: &'a dyn Cpu,
}

impl<'a, T: Transport, B: RegisterBus, C: IrqChip> Dispatcher<'a, T, B, C> {
    pub fn new(transport: T, bus: B, chip: C, virq: &'a VirqController, cpu: &'a dyn Cpu) -> Self {
        Self {
            transport,
            bus,
            chip,
            virq,
            cpu,
        }
    }

    /// Execute commands until the receive FIFO is empty.
    ///
    /// Returns the number of commands executed.
    pub fn process(&mut self) -> usize {
        critical::need_sleep(self.cpu);

        let mut count = 0;
        while let Some(word) = self.transport.try_recv() {
            self.execute(CommandWord::from_bits(word));
            count += 1;
        }
        count
    }

    /// Execute a single decoded command.
    pub fn execute(&mut self, cmd: CommandWord) {
        let Some(mode) = cmd.command_mode() else {
            log::debug!("pxicmd: ignoring {:#010x}", cmd.into_bits());
            return;
        };
        let addr = cmd.address();
        let width = cmd.width();
        if width.is_none() && mode.is_register_access() {
            log::debug!("pxicmd: bad width {} at {:#010x}", cmd.size(), addr);
        }

        match mode {
            CommandMode::Write => {
                let value = self.transport.recv();
                if let Some(width) = width {
                    self.bus.write(addr, width, value);
                }
            }
            CommandMode::Read => {
                let value = match width {
                    Some(width) => self.bus.read(addr, width),
                    None => BAD_READ,
                };
                self.transport.send(value);
            }
            CommandMode::IoSet => {
                let set = self.transport.recv();
                self.update(addr, width, set, 0);
            }
            CommandMode::IoClr => {
                let clr = self.transport.recv();
                self.update(addr, width, 0, clr);
            }
            CommandMode::IrqGet => {
                let virq = self.virq;
                let transport = &mut self.transport;
                critical::with(self.cpu, |cs| {
                    let line = virq.get_pending(cs);
                    transport.send(line);
                });
            }
            CommandMode::IrqMask => {
                let line = cmd.reg() & LINE_MASK;
                let virq = self.virq;
                let chip = &mut self.chip;
                critical::with(self.cpu, |cs| virq.mask(cs, chip, line));
            }
            CommandMode::IrqUnmask => {
                let line = cmd.reg() & LINE_MASK;
                let virq = self.virq;
                let chip = &mut self.chip;
                critical::with(self.cpu, |cs| virq.unmask(cs, chip, line));
            }
        }
    }

    /// Read-modify-write: `(value | set) & !clr`.
    fn update(&mut self, addr: u32, width: Option<Width>, set: u32, clr: u32) {
        let Some(width) = width else {
            return;
        };
        let value = (self.bus.read(addr, width) | set) & !clr;
        self.bus.write(addr, width, value & width.mask());
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn chip(&self) -> &C {
        &self.chip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critical::CriticalSection;
    use crate::sim::{noop_handler, SimCpu, SimIrqChip, SimRegisters, SimTransport};
    use crate::virq::NONE_PENDING;
    use proptest::prelude::*;

    const WRITE: u8 = 0;
    const READ: u8 = 1;
    const IOSET: u8 = 2;
    const IOCLR: u8 = 3;
    const IRQGET: u8 = 4;
    const IRQMASK: u8 = 5;
    const IRQUNMASK: u8 = 6;

    fn word(mode: u8, size: u8, reg: u32) -> u32 {
        CommandWord::encode(mode, size, reg).into_bits()
    }

    type TestDispatcher<'a> = Dispatcher<'a, SimTransport, SimRegisters, SimIrqChip>;

    fn dispatcher<'a>(virq: &'a VirqController, cpu: &'a SimCpu) -> TestDispatcher<'a> {
        Dispatcher::new(SimTransport::new(), SimRegisters::new(), SimIrqChip::new(), virq, cpu)
    }

    proptest! {
        #[test]
        fn command_word_fields_roundtrip(mode in 0u8..16, size in 0u8..16, reg in 0u32..(1 << 24)) {
            let raw = word(mode, size, reg);
            prop_assert_eq!(raw >> 28, mode as u32);
            prop_assert_eq!((raw >> 24) & 0xF, size as u32);
            prop_assert_eq!(raw & 0xFF_FFFF, reg);

            let cmd = CommandWord::from_bits(raw);
            prop_assert_eq!((cmd.mode(), cmd.size(), cmd.reg()), (mode, size, reg));
        }
    }

    #[test]
    fn test_decode_known_word() {
        let cmd = CommandWord::from_bits(0x1200_1234);
        assert_eq!(cmd.command_mode(), Some(CommandMode::Read));
        assert_eq!(cmd.width(), Some(Width::Word));
        assert_eq!(cmd.address(), 0x1000_1234);
    }

    #[test]
    fn test_write_then_read_each_width() {
        let cpu = SimCpu::new();
        let virq = VirqController::new(noop_handler);
        let mut d = dispatcher(&virq, &cpu);

        d.transport_mut().push_rx(&[word(WRITE, 2, 0x100), 0xCAFE_F00D]);
        d.transport_mut().push_rx(&[word(WRITE, 1, 0x104), 0x1234_5678]);
        d.transport_mut().push_rx(&[word(WRITE, 0, 0x108), 0xFFFF_FFAA]);
        d.transport_mut().push_rx(&[word(READ, 2, 0x100), word(READ, 1, 0x104), word(READ, 0, 0x108)]);
        assert_eq!(d.process(), 6);

        assert_eq!(d.transport().sent(), &[0xCAFE_F00D, 0x5678, 0xAA]);
        assert_eq!(d.bus().peek(0x1000_0104, 4), 0x5678);
        assert_eq!(d.bus().peek(0x1000_0108, 4), 0xAA);
    }

    #[test]
    fn test_bad_width_sentinel_and_dropped_writes() {
        let cpu = SimCpu::new();
        let virq = VirqController::new(noop_handler);
        let mut d = dispatcher(&virq, &cpu);

        for size in 3..16u8 {
            d.transport_mut().push_rx(&[word(WRITE, 2, 0x20), 0x0BAD_F00D]);
            d.transport_mut().push_rx(&[word(WRITE, size, 0x20), 0xFFFF_FFFF]);
            d.transport_mut().push_rx(&[word(IOSET, size, 0x20), 0xFFFF_FFFF]);
            d.transport_mut().push_rx(&[word(IOCLR, size, 0x20), 0xFFFF_FFFF]);
            d.transport_mut().push_rx(&[word(READ, size, 0x20)]);
            d.process();

            assert_eq!(d.transport_mut().take_sent(), vec![BAD_READ]);
            assert_eq!(d.bus().peek(0x1000_0020, 4), 0x0BAD_F00D);
            // Operands were consumed: nothing left to misinterpret.
            assert!(d.transport().is_rx_empty());
        }
    }

    #[test]
    fn test_ioset_ioclr() {
        let cpu = SimCpu::new();
        let virq = VirqController::new(noop_handler);
        let mut d = dispatcher(&virq, &cpu);
        let addr = 0x1000_0040;
        let mask = 0x00F0_0F0F;

        for original in [0u32, 0xFFFF_FFFF, 0x1234_5678, 0x0F0F_0F0F] {
            // IOSET then IOCLR restores bits outside the mask, clears those inside.
            d.transport_mut().push_rx(&[word(WRITE, 2, 0x40), original]);
            d.transport_mut().push_rx(&[word(IOSET, 2, 0x40), mask, word(IOCLR, 2, 0x40), mask]);
            d.process();
            assert_eq!(d.bus().peek(addr, 4), original & !mask);

            // IOSET(mask) then IOCLR(mask) restores the register when the mask
            // bits start clear.
            d.transport_mut().push_rx(&[word(WRITE, 2, 0x40), original & !mask]);
            d.transport_mut().push_rx(&[word(IOSET, 2, 0x40), mask, word(IOCLR, 2, 0x40), mask]);
            d.process();
            assert_eq!(d.bus().peek(addr, 4), original & !mask);

            // IOCLR then IOSET leaves exactly the mask bits set.
            d.transport_mut().push_rx(&[word(WRITE, 2, 0x40), original]);
            d.transport_mut().push_rx(&[word(IOCLR, 2, 0x40), mask, word(IOSET, 2, 0x40), mask]);
            d.process();
            assert_eq!(d.bus().peek(addr, 4) & mask, mask);
            assert_eq!(d.bus().peek(addr, 4), original | mask);
        }
    }

    #[test]
    fn test_ioset_byte_width_truncates() {
        let cpu = SimCpu::new();
        let virq = VirqController::new(noop_handler);
        let mut d = dispatcher(&virq, &cpu);

        d.transport_mut().push_rx(&[word(WRITE, 2, 0x50), 0xAABB_CC00]);
        d.transport_mut().push_rx(&[word(IOSET, 0, 0x50), 0xFFFF_FF0F]);
        d.process();
        assert_eq!(d.bus().peek(0x1000_0050, 4), 0xAABB_CC0F);
    }

    #[test]
    fn test_irq_commands() {
        let cpu = SimCpu::new();
        let virq = VirqController::new(noop_handler);
        let mut d = dispatcher(&virq, &cpu);

        // Upper reg bits are ignored when selecting the line.
        d.transport_mut().push_rx(&[word(IRQUNMASK, 0, 0x20 | 4), word(IRQUNMASK, 0, 9)]);
        d.process();
        assert!(d.chip().is_enabled(4));
        assert!(d.chip().is_enabled(9));
        assert!(!critical::is_in_critical(&cpu));

        {
            let sync = SimTransport::new();
            let cs = CriticalSection::enter(&cpu);
            virq.fire(&cs, 4, &sync);
            virq.fire(&cs, 9, &sync);
        }

        d.transport_mut().push_rx(&[word(IRQMASK, 0, 9), word(IRQGET, 0, 0), word(IRQGET, 0, 0)]);
        d.process();
        assert!(!d.chip().is_enabled(9));
        assert_eq!(d.transport().sent(), &[4, NONE_PENDING]);
    }

    #[test]
    fn test_unknown_mode_is_ignored() {
        let cpu = SimCpu::new();
        let virq = VirqController::new(noop_handler);
        let mut d = dispatcher(&virq, &cpu);

        for mode in 7..16u8 {
            d.transport_mut().push_rx(&[word(mode, 2, 0x10)]);
        }
        d.transport_mut().push_rx(&[word(READ, 2, 0x10)]);
        assert_eq!(d.process(), 10);
        assert_eq!(d.transport().sent(), &[0]);
        assert_eq!(d.bus().writes(), 0);
    }
}
