//! Register-level transfer primitives
//!
//! [`RawBus`] owns the register file and the host and knows how to start one
//! transfer, wait for it, and drive the DC/CS lines. Every higher layer
//! (transactions, windowing, streaming, DMA) is built from these calls.

use platform::registers::{BusRegisters, Reg, DATA_WORDS};
use platform::{Host, PinState};

use crate::clock::ClockDividers;
use crate::config::{DataLen, WaitPolicy};
use crate::error::BusError;

/// Data buffer word `index`, wrapping inside the 16-word buffer.
#[allow(clippy::cast_possible_truncation)] // Safety: masked to 0..16
pub(crate) const fn word(index: usize) -> Reg {
    Reg::W((index % DATA_WORDS) as u8)
}

pub(crate) struct RawBus<R, H> {
    pub(crate) regs: R,
    pub(crate) host: H,
    wait: WaitPolicy,
    data_len: DataLen,
    dc: Option<u8>,
    cs: Option<u8>,
    pub(crate) clocks: ClockDividers,
    pub(crate) fill_mode: bool,
}

impl<R: BusRegisters, H: Host> RawBus<R, H> {
    pub(crate) fn new(regs: R, host: H, wait: WaitPolicy, data_len: DataLen) -> Self {
        Self {
            regs,
            host,
            wait,
            data_len,
            dc: None,
            cs: None,
            clocks: ClockDividers::default(),
            fill_mode: false,
        }
    }

    pub(crate) fn set_control_pins(&mut self, dc: Option<u8>, cs: Option<u8>) {
        self.dc = dc;
        self.cs = cs;
    }

    pub(crate) fn has_cs(&self) -> bool {
        self.cs.is_some()
    }

    /// Command/parameter frame width in bits.
    pub(crate) fn frame_bits(&self) -> u32 {
        self.data_len.bits()
    }

    pub(crate) fn is_wide(&self) -> bool {
        self.data_len == DataLen::Bits16
    }

    // -----------------------------------------------------------------------
    // Busy handling
    // -----------------------------------------------------------------------

    /// Poll until the current transfer (CPU or DMA) has finished.
    pub(crate) fn wait_idle(&mut self) -> Result<(), BusError> {
        let mut polls: u32 = 0;
        while self.regs.is_busy() {
            polls = polls.wrapping_add(1);
            if self.wait.max_polls.is_some_and(|max| polls >= max) {
                warn!("SPI controller still busy after {} polls", polls);
                return Err(BusError::Timeout);
            }
            if polls.checked_rem(self.wait.yield_every) == Some(0) {
                self.host.yield_now();
            }
        }
        Ok(())
    }

    pub(crate) fn exec(&mut self) {
        self.regs.start();
    }

    pub(crate) fn set_write_len(&mut self, bits: u32) {
        self.regs.write(Reg::MosiDlen, bits.wrapping_sub(1));
    }

    pub(crate) fn set_read_len(&mut self, bits: u32) {
        self.regs.write(Reg::MisoDlen, bits.wrapping_sub(1));
    }

    // -----------------------------------------------------------------------
    // Control lines
    // -----------------------------------------------------------------------

    /// Data phase. Waits first so the line never changes mid-transfer.
    pub(crate) fn dc_h(&mut self) -> Result<(), BusError> {
        self.wait_idle()?;
        if let Some(dc) = self.dc {
            self.host.set_pin(dc, PinState::High);
        }
        Ok(())
    }

    /// Command phase.
    pub(crate) fn dc_l(&mut self) -> Result<(), BusError> {
        self.wait_idle()?;
        if let Some(dc) = self.dc {
            self.host.set_pin(dc, PinState::Low);
        }
        Ok(())
    }

    pub(crate) fn cs_h(&mut self) {
        if let Some(cs) = self.cs {
            self.host.set_pin(cs, PinState::High);
        }
    }

    pub(crate) fn cs_l(&mut self) {
        if let Some(cs) = self.cs {
            self.host.set_pin(cs, PinState::Low);
        }
    }

    // -----------------------------------------------------------------------
    // Clock domains
    // -----------------------------------------------------------------------

    pub(crate) fn write_clock(&mut self) {
        self.regs.write(Reg::Clock, self.clocks.write);
    }

    pub(crate) fn read_clock(&mut self) {
        self.regs.write(Reg::Clock, self.clocks.read);
    }

    pub(crate) fn fill_clock(&mut self) {
        self.regs.write(Reg::Clock, self.clocks.fill);
        self.fill_mode = true;
    }

    /// Mandatory exit from fill mode before any non-fill transfer.
    pub(crate) fn leave_fill_mode(&mut self) -> Result<(), BusError> {
        if self.fill_mode {
            self.fill_mode = false;
            self.wait_idle()?;
            self.write_clock();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Single frames
    // -----------------------------------------------------------------------

    /// One command frame with DC low.
    pub(crate) fn write_cmd(&mut self, cmd: u8) -> Result<(), BusError> {
        let bits = self.frame_bits();
        let value = if self.is_wide() {
            u32::from(cmd) << 8
        } else {
            u32::from(cmd)
        };
        self.leave_fill_mode()?;
        self.dc_l()?;
        self.set_write_len(bits);
        self.regs.write(Reg::W(0), value);
        self.exec();
        Ok(())
    }

    /// Up to 32 bits of data with DC high; `raw` is in wire byte order.
    pub(crate) fn write_data(&mut self, raw: u32, bits: u32) -> Result<(), BusError> {
        self.dc_h()?;
        self.set_write_len(bits);
        self.regs.write(Reg::W(0), raw);
        self.exec();
        Ok(())
    }

    /// One parameter byte; a 16-bit frame sends it second, after a zero byte.
    pub(crate) fn write_param(&mut self, byte: u8) -> Result<(), BusError> {
        let bits = self.frame_bits();
        let value = if self.is_wide() {
            u32::from(byte) << 8
        } else {
            u32::from(byte)
        };
        self.leave_fill_mode()?;
        self.write_data(value, bits)
    }

    /// Clock in `bits` and return the first data word.
    pub(crate) fn read_data(&mut self, bits: u32) -> Result<u32, BusError> {
        self.set_read_len(bits);
        self.exec();
        self.wait_idle()?;
        Ok(self.regs.read(Reg::W(0)))
    }

    // -----------------------------------------------------------------------
    // Data buffer
    // -----------------------------------------------------------------------

    /// Copy `bytes` into the buffer starting at word `first`, zero-padding
    /// the last word.
    #[allow(clippy::arithmetic_side_effects)] // Safety: i < 16 chunks of a 64-byte bound
    pub(crate) fn load_words(&mut self, first: usize, bytes: &[u8]) {
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut w = [0u8; 4];
            if let Some(dst) = w.get_mut(..chunk.len()) {
                dst.copy_from_slice(chunk);
            }
            self.regs.write(word(first + i), u32::from_le_bytes(w));
        }
    }

    /// Copy `dst.len()` bytes out of the buffer starting at word `first`.
    #[allow(clippy::arithmetic_side_effects)] // Safety: i < 16 chunks of a 64-byte bound
    pub(crate) fn unload_words(&self, first: usize, dst: &mut [u8]) {
        for (i, chunk) in dst.chunks_mut(4).enumerate() {
            let w = self.regs.read(word(first + i)).to_le_bytes();
            if let Some(src) = w.get(..chunk.len()) {
                chunk.copy_from_slice(src);
            }
        }
    }
}
