//! Simulated bus for testing
//!
//! [`SimBus`] models one SPI controller plus its host: a register bank that
//! "shifts" instantly when a transfer is started, GPIO levels, bus ownership
//! and DMA resets. The register and host halves share one state, so a driver
//! can own both while the test keeps a [`SimBus`] handle to inspect the
//! recorded [`BusEvent`] trace.

#![cfg(any(test, feature = "std"))]
#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)] // test double

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use crate::gpio::{PinMode, PinState};
use crate::host::{BusPins, Host, HostError};
use crate::registers::{
    BusRegisters, Reg, SpiHost, DATA_WORDS, SPI_DMA_CONTINUE, SPI_LINK_ADDR_MASK, SPI_LINK_START,
    SPI_USR, SPI_USR_MISO, SPI_USR_MISO_HIGHPART, SPI_USR_MOSI, SPI_USR_MOSI_HIGHPART,
};

const SLOTS: usize = 13 + DATA_WORDS;
const BUFFER_BYTES: usize = DATA_WORDS * 4;
const GPIO_COUNT: usize = 64;

/// Default APB clock of the simulated host.
pub const SIM_APB_HZ: u32 = 80_000_000;

fn slot(reg: Reg) -> usize {
    match reg {
        Reg::Cmd => 0,
        Reg::Ctrl => 1,
        Reg::Ctrl1 => 2,
        Reg::Ctrl2 => 3,
        Reg::Clock => 4,
        Reg::User => 5,
        Reg::MosiDlen => 6,
        Reg::MisoDlen => 7,
        Reg::Pin => 8,
        Reg::Slave => 9,
        Reg::DmaConf => 10,
        Reg::DmaOutLink => 11,
        Reg::DmaInLink => 12,
        Reg::W(n) => 13 + usize::from(n & 0x0F),
    }
}

/// One CPU-loaded transfer through the data buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// DC line high (data phase) when the transfer started.
    pub data: bool,
    /// Chip-select asserted (low, or no CS pin configured).
    pub selected: bool,
    /// Bits shifted.
    pub bits: u32,
    /// Bytes shifted, in wire order.
    pub bytes: Vec<u8>,
    /// Transfer used W8..W15.
    pub high_part: bool,
    /// Clock register value.
    pub clock: u32,
}

/// Everything the simulated controller and host observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// MOSI transfer from the data buffer.
    Write(Transfer),
    /// MISO transfer into the data buffer.
    Read(Transfer),
    /// MOSI transfer fed by a descriptor chain.
    DmaWrite {
        /// DC line high
        data: bool,
        /// Bits requested (0 for an endless transfer)
        bits: u32,
        /// Link register address field
        link: u32,
        /// Continuous (ring) mode
        continuous: bool,
    },
    /// MISO transfer into a descriptor chain.
    DmaRead {
        /// Bits requested
        bits: u32,
        /// Link register address field
        link: u32,
    },
    /// Host routed the bus.
    BusInit,
    /// Host detached the bus.
    BusDeinit,
    /// Exclusive ownership taken.
    Acquire,
    /// Ownership handed back.
    Release,
    /// DMA module reset.
    DmaReset,
}

/// Bytes sent after one command, grouped for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Command opcode (last byte of the command transfer).
    pub opcode: u8,
    /// Data bytes shifted by the CPU after the command.
    pub data: Vec<u8>,
    /// Bits shifted by DMA after the command.
    pub dma_bits: u64,
}

#[derive(Debug)]
struct SimState {
    regs: [u32; SLOTS],
    pins: [PinState; GPIO_COUNT],
    modes: Vec<(u8, PinMode)>,
    dc: Option<u8>,
    cs: Option<u8>,
    trace: Vec<BusEvent>,
    miso: VecDeque<u8>,
    busy_polls: u32,
    pending_busy: u32,
    stalled: bool,
    apb: u32,
    acquired: bool,
    yields: usize,
    dma_resets: usize,
    dma_kicks: usize,
    fail_init: bool,
    fail_acquire: bool,
}

impl SimState {
    fn buffer_byte(&self, index: usize) -> u8 {
        let word = self.regs[13 + (index % BUFFER_BYTES) / 4];
        word.to_le_bytes()[index % 4]
    }

    fn set_buffer_byte(&mut self, index: usize, value: u8) {
        let slot = 13 + (index % BUFFER_BYTES) / 4;
        let mut bytes = self.regs[slot].to_le_bytes();
        bytes[index % 4] = value;
        self.regs[slot] = u32::from_le_bytes(bytes);
    }

    fn level(&self, pin: Option<u8>, absent: PinState) -> PinState {
        pin.map_or(absent, |p| self.pins[usize::from(p) % GPIO_COUNT])
    }

    fn execute(&mut self) {
        let user = self.regs[slot(Reg::User)];
        let data = self.level(self.dc, PinState::High) == PinState::High;
        let selected = self.level(self.cs, PinState::Low) == PinState::Low;
        let clock = self.regs[slot(Reg::Clock)];

        if user & SPI_USR_MOSI != 0 {
            let bits = self.regs[slot(Reg::MosiDlen)].wrapping_add(1);
            let link = self.regs[slot(Reg::DmaOutLink)];
            if link & SPI_LINK_START != 0 {
                self.regs[slot(Reg::DmaOutLink)] = link & !SPI_LINK_START;
                let continuous = self.regs[slot(Reg::DmaConf)] & SPI_DMA_CONTINUE != 0;
                self.trace.push(BusEvent::DmaWrite {
                    data,
                    bits,
                    link: link & SPI_LINK_ADDR_MASK,
                    continuous,
                });
                return;
            }
            let high_part = user & SPI_USR_MOSI_HIGHPART != 0;
            let base = if high_part { BUFFER_BYTES / 2 } else { 0 };
            let len = bits.div_ceil(8) as usize;
            let bytes = (0..len).map(|i| self.buffer_byte(base + i)).collect();
            self.trace.push(BusEvent::Write(Transfer {
                data,
                selected,
                bits,
                bytes,
                high_part,
                clock,
            }));
        } else if user & SPI_USR_MISO != 0 {
            let bits = self.regs[slot(Reg::MisoDlen)].wrapping_add(1);
            let link = self.regs[slot(Reg::DmaInLink)];
            if link & SPI_LINK_START != 0 {
                self.regs[slot(Reg::DmaInLink)] = link & !SPI_LINK_START;
                self.trace.push(BusEvent::DmaRead {
                    bits,
                    link: link & SPI_LINK_ADDR_MASK,
                });
                return;
            }
            let high_part = user & SPI_USR_MISO_HIGHPART != 0;
            let base = if high_part { BUFFER_BYTES / 2 } else { 0 };
            let len = bits.div_ceil(8) as usize;
            let mut bytes = Vec::with_capacity(len);
            for i in 0..len {
                let b = self.miso.pop_front().unwrap_or(0);
                self.set_buffer_byte(base + i, b);
                bytes.push(b);
            }
            self.trace.push(BusEvent::Read(Transfer {
                data,
                selected,
                bits,
                bytes,
                high_part,
                clock,
            }));
        }
    }
}

/// Handle to a simulated controller + host pair.
#[derive(Debug, Clone)]
pub struct SimBus {
    state: Rc<RefCell<SimState>>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// Idle controller, all pins low, APB at [`SIM_APB_HZ`].
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                regs: [0; SLOTS],
                pins: [PinState::Low; GPIO_COUNT],
                modes: Vec::new(),
                dc: None,
                cs: None,
                trace: Vec::new(),
                miso: VecDeque::new(),
                busy_polls: 0,
                pending_busy: 0,
                stalled: false,
                apb: SIM_APB_HZ,
                acquired: false,
                yields: 0,
                dma_resets: 0,
                dma_kicks: 0,
                fail_init: false,
                fail_acquire: false,
            })),
        }
    }

    /// Tell the trace which GPIOs are the DC and CS lines.
    pub fn with_control_pins(self, dc: Option<u8>, cs: Option<u8>) -> Self {
        {
            let mut s = self.state.borrow_mut();
            s.dc = dc;
            s.cs = cs;
        }
        self
    }

    /// Register-bank half, to hand to the driver.
    pub fn registers(&self) -> SimRegisters {
        SimRegisters {
            state: Rc::clone(&self.state),
        }
    }

    /// Host half, to hand to the driver.
    pub fn host(&self) -> SimHost {
        SimHost {
            state: Rc::clone(&self.state),
        }
    }

    /// Change the reported APB clock.
    pub fn set_apb_frequency(&self, hz: u32) {
        self.state.borrow_mut().apb = hz;
    }

    /// Queue bytes the panel will shift out on MISO.
    pub fn push_miso(&self, bytes: &[u8]) {
        self.state.borrow_mut().miso.extend(bytes.iter().copied());
    }

    /// Report busy for `polls` reads of CMD after every start.
    pub fn set_busy_polls(&self, polls: u32) {
        self.state.borrow_mut().busy_polls = polls;
    }

    /// Keep the controller busy forever (a hung peripheral).
    pub fn stall(&self, stalled: bool) {
        self.state.borrow_mut().stalled = stalled;
    }

    /// Make the next `init_bus` fail.
    pub fn fail_bus_init(&self, fail: bool) {
        self.state.borrow_mut().fail_init = fail;
    }

    /// Make `acquire_bus` fail.
    pub fn fail_acquire(&self, fail: bool) {
        self.state.borrow_mut().fail_acquire = fail;
    }

    /// Recorded events.
    pub fn trace(&self) -> Vec<BusEvent> {
        self.state.borrow().trace.clone()
    }

    /// Drop recorded events.
    pub fn clear_trace(&self) {
        self.state.borrow_mut().trace.clear();
    }

    /// CPU-loaded writes only.
    pub fn writes(&self) -> Vec<Transfer> {
        self.state
            .borrow()
            .trace
            .iter()
            .filter_map(|e| match e {
                BusEvent::Write(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    /// Opcodes of every command-phase write, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.frames().into_iter().map(|f| f.opcode).collect()
    }

    /// Group the trace into command + following data.
    ///
    /// Data shifted before the first command is dropped.
    pub fn frames(&self) -> Vec<CommandFrame> {
        let mut frames: Vec<CommandFrame> = Vec::new();
        for event in &self.state.borrow().trace {
            match event {
                BusEvent::Write(t) if !t.data => frames.push(CommandFrame {
                    opcode: t.bytes.last().copied().unwrap_or(0),
                    data: Vec::new(),
                    dma_bits: 0,
                }),
                BusEvent::Write(t) => {
                    if let Some(f) = frames.last_mut() {
                        f.data.extend_from_slice(&t.bytes);
                    }
                }
                BusEvent::DmaWrite { bits, .. } => {
                    if let Some(f) = frames.last_mut() {
                        f.dma_bits += u64::from(*bits);
                    }
                }
                _ => {}
            }
        }
        frames
    }

    /// Current register value.
    pub fn register(&self, reg: Reg) -> u32 {
        self.state.borrow().regs[slot(reg)]
    }

    /// Current GPIO level.
    pub fn pin(&self, pin: u8) -> PinState {
        self.state.borrow().pins[usize::from(pin) % GPIO_COUNT]
    }

    /// Last mode configured for a GPIO.
    pub fn pin_mode(&self, pin: u8) -> Option<PinMode> {
        self.state
            .borrow()
            .modes
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, m)| *m)
    }

    /// Bus currently owned.
    pub fn is_acquired(&self) -> bool {
        self.state.borrow().acquired
    }

    /// Cooperative yields taken so far.
    pub fn yields(&self) -> usize {
        self.state.borrow().yields
    }

    /// DMA module resets so far.
    pub fn dma_resets(&self) -> usize {
        self.state.borrow().dma_resets
    }

    /// `dma_transfer_active` notifications so far.
    pub fn dma_kicks(&self) -> usize {
        self.state.borrow().dma_kicks
    }
}

/// Register-bank half of a [`SimBus`].
#[derive(Debug)]
pub struct SimRegisters {
    state: Rc<RefCell<SimState>>,
}

impl BusRegisters for SimRegisters {
    fn read(&self, reg: Reg) -> u32 {
        let mut s = self.state.borrow_mut();
        if reg == Reg::Cmd {
            if s.stalled {
                return SPI_USR;
            }
            if s.pending_busy > 0 {
                s.pending_busy -= 1;
                return SPI_USR;
            }
            return 0;
        }
        s.regs[slot(reg)]
    }

    fn write(&mut self, reg: Reg, value: u32) {
        let mut s = self.state.borrow_mut();
        if reg == Reg::Cmd {
            if value & SPI_USR != 0 {
                s.execute();
                s.pending_busy = s.busy_polls;
            }
            return;
        }
        s.regs[slot(reg)] = value;
    }
}

/// Host half of a [`SimBus`].
#[derive(Debug)]
pub struct SimHost {
    state: Rc<RefCell<SimState>>,
}

impl Host for SimHost {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) {
        self.state.borrow_mut().modes.push((pin, mode));
    }

    fn set_pin(&mut self, pin: u8, state: PinState) {
        self.state.borrow_mut().pins[usize::from(pin) % GPIO_COUNT] = state;
    }

    fn init_bus(&mut self, _pins: &BusPins) -> Result<(), HostError> {
        let mut s = self.state.borrow_mut();
        if s.fail_init {
            return Err(HostError::BusInit);
        }
        s.trace.push(BusEvent::BusInit);
        Ok(())
    }

    fn deinit_bus(&mut self, _host: SpiHost) {
        self.state.borrow_mut().trace.push(BusEvent::BusDeinit);
    }

    fn acquire_bus(&mut self, _host: SpiHost) -> Result<(), HostError> {
        let mut s = self.state.borrow_mut();
        if s.fail_acquire {
            return Err(HostError::Acquire);
        }
        s.acquired = true;
        s.trace.push(BusEvent::Acquire);
        Ok(())
    }

    fn release_bus(&mut self, _host: SpiHost) {
        let mut s = self.state.borrow_mut();
        s.acquired = false;
        s.trace.push(BusEvent::Release);
    }

    fn apb_frequency(&self) -> u32 {
        self.state.borrow().apb
    }

    fn yield_now(&mut self) {
        self.state.borrow_mut().yields += 1;
    }

    fn reset_dma(&mut self) {
        let mut s = self.state.borrow_mut();
        s.dma_resets += 1;
        s.trace.push(BusEvent::DmaReset);
    }

    fn dma_transfer_active(&mut self, _channel: u8) {
        self.state.borrow_mut().dma_kicks += 1;
    }
}
