//! Bus register file
//!
//! The SPI master is driven entirely through a small set of memory-mapped
//! registers. Everything above this module (transaction controller, window
//! protocol, streaming engine) is written against [`BusRegisters`], so the same
//! code runs on silicon ([`Esp32Spi`]) and against the simulated bank in
//! [`crate::mocks`].
//!
//! Bit constants follow the ESP32 technical reference manual, chapter "SPI".

/// Number of 32-bit words in the shift-register data buffer (W0..W15).
pub const DATA_WORDS: usize = 16;

/// Word index of the high half of the data buffer (W8).
pub const HIGH_PART_WORD: u8 = 8;

/// Named register slots of one SPI controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// Command register; holds the user-transfer start/busy bit.
    Cmd,
    /// Control register (bit order, I/O modes).
    Ctrl,
    /// Control register 1 (CS hold timing).
    Ctrl1,
    /// Control register 2 (setup/hold delays).
    Ctrl2,
    /// Clock divisor.
    Clock,
    /// User-transfer phase enables.
    User,
    /// MOSI bit length minus one.
    MosiDlen,
    /// MISO bit length minus one.
    MisoDlen,
    /// Pin polarity configuration.
    Pin,
    /// Slave configuration.
    Slave,
    /// Data buffer word `W0..W15`.
    W(u8),
    /// DMA configuration.
    DmaConf,
    /// DMA outbound link (descriptor head + start).
    DmaOutLink,
    /// DMA inbound link (descriptor head + start).
    DmaInLink,
}

impl Reg {
    /// Byte offset of the register from the controller base address.
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Self::Cmd => 0x00,
            Self::Ctrl => 0x08,
            Self::Ctrl1 => 0x0C,
            Self::Ctrl2 => 0x14,
            Self::Clock => 0x18,
            Self::User => 0x1C,
            Self::MosiDlen => 0x28,
            Self::MisoDlen => 0x2C,
            Self::Pin => 0x34,
            Self::Slave => 0x38,
            Self::W(n) => 0x80 + 4 * (n as usize & 0x0F),
            Self::DmaConf => 0x100,
            Self::DmaOutLink => 0x104,
            Self::DmaInLink => 0x108,
        }
    }
}

// ── CMD ──────────────────────────────────────────────────────────────────────

/// Start a user transfer; reads back set while the transfer is in flight.
pub const SPI_USR: u32 = 1 << 18;

// ── USER ─────────────────────────────────────────────────────────────────────

/// Full-duplex mode.
pub const SPI_DOUTDIN: u32 = 1 << 0;
/// Sample on the opposite clock edge (SPI modes 1 and 2).
pub const SPI_CK_OUT_EDGE: u32 = 1 << 7;
/// 3-wire half-duplex: MOSI doubles as MISO.
pub const SPI_SIO: u32 = 1 << 16;
/// Receive into W8..W15 instead of W0..W7.
pub const SPI_USR_MISO_HIGHPART: u32 = 1 << 24;
/// Transmit from W8..W15 instead of W0..W7.
pub const SPI_USR_MOSI_HIGHPART: u32 = 1 << 25;
/// Enable the MOSI phase.
pub const SPI_USR_MOSI: u32 = 1 << 27;
/// Enable the MISO phase.
pub const SPI_USR_MISO: u32 = 1 << 28;

// ── PIN ──────────────────────────────────────────────────────────────────────

/// Clock idles high (SPI modes 2 and 3).
pub const SPI_CK_IDLE_EDGE: u32 = 1 << 29;

// ── CLOCK ────────────────────────────────────────────────────────────────────

/// Bypass the divider and clock the bus at the APB frequency.
pub const SPI_CLK_EQU_SYSCLK: u32 = 1 << 31;

// ── SLAVE ────────────────────────────────────────────────────────────────────

/// Transfer-done interrupt raw flag.
pub const SPI_TRANS_DONE: u32 = 1 << 4;
/// Slave mode enable.
pub const SPI_SLAVE_MODE: u32 = 1 << 30;

// ── DMA_CONF ─────────────────────────────────────────────────────────────────

/// Reset the inbound DMA state machine.
pub const SPI_IN_RST: u32 = 1 << 2;
/// Reset the outbound DMA state machine.
pub const SPI_OUT_RST: u32 = 1 << 3;
/// Reset the AHB master FIFO.
pub const SPI_AHBM_FIFO_RST: u32 = 1 << 4;
/// Reset the AHB master.
pub const SPI_AHBM_RST: u32 = 1 << 5;
/// Burst reads of outbound descriptors.
pub const SPI_OUTDSCR_BURST_EN: u32 = 1 << 10;
/// Burst reads of inbound descriptors.
pub const SPI_INDSCR_BURST_EN: u32 = 1 << 11;
/// Burst reads of outbound data.
pub const SPI_OUT_DATA_BURST_EN: u32 = 1 << 12;
/// Stop an outbound continuous transfer.
pub const SPI_DMA_TX_STOP: u32 = 1 << 15;
/// Continuous transfer mode (ring descriptors).
pub const SPI_DMA_CONTINUE: u32 = 1 << 16;

/// All reset bits of `DMA_CONF` used by the DMA reset sequence.
pub const SPI_DMA_RESET_BITS: u32 = SPI_OUT_RST | SPI_IN_RST | SPI_AHBM_RST | SPI_AHBM_FIFO_RST;

/// All burst-enable bits of `DMA_CONF`.
pub const SPI_DMA_BURST_BITS: u32 = SPI_OUTDSCR_BURST_EN | SPI_OUT_DATA_BURST_EN;

// ── DMA_OUT_LINK / DMA_IN_LINK ───────────────────────────────────────────────

/// Start fetching the descriptor chain.
pub const SPI_LINK_START: u32 = 1 << 29;
/// Descriptor address field (low 20 bits of the internal SRAM address).
pub const SPI_LINK_ADDR_MASK: u32 = 0x000F_FFFF;

/// Addressable register file of one SPI controller.
///
/// Reads take `&self`: reading a hardware register has no side effects on the
/// controller modelled here, and the simulated bank uses interior mutability.
pub trait BusRegisters {
    /// Read a register.
    fn read(&self, reg: Reg) -> u32;

    /// Write a register.
    fn write(&mut self, reg: Reg, value: u32);

    /// Read-modify-write a register.
    fn modify(&mut self, reg: Reg, f: impl FnOnce(u32) -> u32) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    /// Set bits in a register.
    fn set_bits(&mut self, reg: Reg, bits: u32) {
        self.modify(reg, |v| v | bits);
    }

    /// Clear bits in a register.
    fn clear_bits(&mut self, reg: Reg, bits: u32) {
        self.modify(reg, |v| v & !bits);
    }

    /// `true` while a user transfer is shifting.
    fn is_busy(&self) -> bool {
        self.read(Reg::Cmd) & SPI_USR != 0
    }

    /// Kick off a user transfer with the currently programmed registers.
    fn start(&mut self) {
        self.write(Reg::Cmd, SPI_USR);
    }
}

impl<T: BusRegisters + ?Sized> BusRegisters for &mut T {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value);
    }
}

/// Hardware SPI controllers usable as a panel bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpiHost {
    /// SPI2 (HSPI).
    Hspi,
    /// SPI3 (VSPI).
    #[default]
    Vspi,
}

impl SpiHost {
    /// Base address of the controller's register block.
    #[must_use]
    pub const fn base_address(self) -> usize {
        match self {
            Self::Hspi => 0x3FF6_4000,
            Self::Vspi => 0x3FF6_5000,
        }
    }
}

/// Memory-mapped register file of a real ESP32 SPI controller.
#[derive(Debug)]
pub struct Esp32Spi {
    base: usize,
}

impl Esp32Spi {
    /// Bind to the register block of `host`.
    ///
    /// # Safety
    ///
    /// Must run on an ESP32 with the controller clock enabled, and no other
    /// code may drive the same controller while this handle exists.
    #[must_use]
    pub unsafe fn new(host: SpiHost) -> Self {
        Self {
            base: host.base_address(),
        }
    }

    fn addr(&self, reg: Reg) -> *mut u32 {
        self.base.wrapping_add(reg.offset()) as *mut u32
    }
}

impl BusRegisters for Esp32Spi {
    fn read(&self, reg: Reg) -> u32 {
        // SAFETY: `new` guarantees `base` is a mapped SPI register block and
        // every `Reg::offset` lies inside it, word aligned.
        unsafe { core::ptr::read_volatile(self.addr(reg)) }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        // SAFETY: as in `read`; `&mut self` serialises writers.
        unsafe { core::ptr::write_volatile(self.addr(reg), value) }
    }
}
