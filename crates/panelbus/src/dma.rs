//! DMA engine: descriptor chain, reset bookkeeping and arming
//!
//! One [`DmaEngine`] belongs to one driver instance. The chain is rebuilt
//! for every transfer, always after the controller has gone idle, since the
//! previous transfer may still be walking it.

use platform::registers::{
    BusRegisters, Reg, SPI_DMA_BURST_BITS, SPI_DMA_CONTINUE, SPI_DMA_TX_STOP, SPI_LINK_ADDR_MASK,
    SPI_LINK_START,
};
use platform::{DescriptorChain, Host};

use crate::bus::RawBus;
use crate::error::BusError;

/// Where a DMA source lives, which decides whether the call may return
/// while the transfer is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    /// Borrowed from the caller: wait for completion.
    Caller,
    /// Driver-owned staging buffer: may stay in flight.
    Staging,
}

/// Off-screen output prepared by `setup_offscreen_dma`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Offscreen {
    bits: u32,
    ring: bool,
}

/// Per-instance DMA state.
#[derive(Debug)]
pub struct DmaEngine {
    channel: u8,
    chain: DescriptorChain,
    needs_reset: bool,
    /// Only set while `chain` holds the scatter chain it describes.
    offscreen: Option<Offscreen>,
    ring_running: bool,
}

impl DmaEngine {
    pub(crate) const fn new(channel: u8) -> Self {
        Self {
            channel,
            chain: DescriptorChain::new(),
            needs_reset: false,
            offscreen: None,
            ring_running: false,
        }
    }

    /// Channel in use.
    #[must_use]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Descriptors of the most recent transfer.
    #[must_use]
    pub fn chain(&self) -> &DescriptorChain {
        &self.chain
    }

    /// A reset is owed before the next chain is armed.
    #[must_use]
    pub fn reset_pending(&self) -> bool {
        self.needs_reset
    }

    /// An endless off-screen chain has been started and not stopped.
    #[must_use]
    pub fn ring_running(&self) -> bool {
        self.ring_running
    }

    /// The chain is about to be rebuilt for something else.
    fn forget_offscreen(&mut self) {
        self.offscreen = None;
        self.ring_running = false;
    }

    pub(crate) fn request_reset(&mut self) {
        self.needs_reset = true;
    }

    pub(crate) fn reset_now<H: Host>(&mut self, host: &mut H) {
        self.needs_reset = false;
        trace!("DMA module reset on channel {}", self.channel);
        host.reset_dma();
    }

    fn reset_if_needed<H: Host>(&mut self, host: &mut H) {
        if self.needs_reset {
            self.reset_now(host);
        }
    }

    /// Link register value for the chain head.
    #[allow(clippy::cast_possible_truncation)] // Safety: only the low 20 address bits are kept
    fn link(&self) -> u32 {
        SPI_LINK_START | (self.chain.head() as usize as u32 & SPI_LINK_ADDR_MASK)
    }

    fn kick<R: BusRegisters, H: Host>(&self, bus: &mut RawBus<R, H>) {
        bus.regs.write(Reg::DmaOutLink, self.link());
        bus.host.dma_transfer_active(self.channel);
        bus.exec();
    }

    fn finish<R: BusRegisters, H: Host>(
        bus: &mut RawBus<R, H>,
        source: Source,
    ) -> Result<(), BusError> {
        match source {
            Source::Caller => bus.wait_idle(),
            Source::Staging => Ok(()),
        }
    }

    fn arm<R: BusRegisters, H: Host>(&mut self, bus: &mut RawBus<R, H>, bits: u32) {
        bus.set_write_len(bits);
        bus.regs.clear_bits(Reg::DmaConf, SPI_DMA_CONTINUE | SPI_DMA_TX_STOP);
        self.kick(bus);
    }

    // -----------------------------------------------------------------------
    // Pixel data out
    // -----------------------------------------------------------------------

    /// Send `data` as one linear chain.
    pub(crate) fn write_linear<R: BusRegisters, H: Host>(
        &mut self,
        bus: &mut RawBus<R, H>,
        data: &[u8],
        source: Source,
    ) -> Result<(), BusError> {
        bus.dc_h()?;
        self.reset_if_needed(&mut bus.host);
        self.forget_offscreen();
        self.chain
            .build_linear(data.as_ptr(), data.len())
            .map_err(dma_failed)?;
        self.arm(bus, bits_of(data.len()));
        Self::finish(bus, source)
    }

    /// Send `rows` rows of `row_len` bytes whose starts are `stride` apart.
    pub(crate) fn write_strided<R: BusRegisters, H: Host>(
        &mut self,
        bus: &mut RawBus<R, H>,
        data: &[u8],
        row_len: usize,
        rows: usize,
        stride: usize,
    ) -> Result<(), BusError> {
        let needed = stride.saturating_mul(rows.saturating_sub(1)).saturating_add(row_len);
        if data.len() < needed {
            return Err(BusError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        bus.dc_h()?;
        self.reset_if_needed(&mut bus.host);
        self.forget_offscreen();
        self.chain
            .build_strided(data.as_ptr(), row_len, rows, stride)
            .map_err(dma_failed)?;
        self.arm(bus, bits_of(row_len.saturating_mul(rows)));
        Self::finish(bus, Source::Caller)
    }

    // -----------------------------------------------------------------------
    // Off-screen ring output
    // -----------------------------------------------------------------------

    /// Link one descriptor per row pointer.
    pub(crate) fn setup_scatter<R: BusRegisters, H: Host>(
        &mut self,
        bus: &mut RawBus<R, H>,
        rows: &[*const u8],
        row_len: usize,
        ring: bool,
    ) -> Result<(), BusError> {
        bus.wait_idle()?;
        self.reset_if_needed(&mut bus.host);
        self.forget_offscreen();
        self.chain
            .build_scatter(rows, row_len, ring)
            .map_err(dma_failed)?;
        self.offscreen = Some(Offscreen {
            bits: bits_of(row_len.saturating_mul(rows.len())),
            ring,
        });
        Ok(())
    }

    /// Start the prepared off-screen chain in continuous mode.
    ///
    /// Returns `false` when nothing has been prepared.
    pub(crate) fn draw_offscreen<R: BusRegisters, H: Host>(
        &mut self,
        bus: &mut RawBus<R, H>,
    ) -> Result<bool, BusError> {
        let Some(offscreen) = self.offscreen else {
            return Ok(false);
        };
        bus.dc_h()?;
        // A length of zero programs the maximum; a ring never reaches it.
        bus.set_write_len(if offscreen.ring { 0 } else { offscreen.bits });
        bus.regs.clear_bits(Reg::DmaConf, SPI_DMA_BURST_BITS | SPI_DMA_TX_STOP);
        bus.regs.set_bits(Reg::DmaConf, SPI_DMA_CONTINUE);
        self.kick(bus);
        self.ring_running = offscreen.ring;
        Ok(true)
    }

    /// Halt continuous output and reset the DMA module. The prepared chain
    /// is dropped with it; a new `setup_scatter` is needed to draw again.
    pub(crate) fn stop_offscreen<R: BusRegisters, H: Host>(&mut self, bus: &mut RawBus<R, H>) {
        bus.regs.set_bits(Reg::DmaConf, SPI_DMA_TX_STOP);
        self.reset_now(&mut bus.host);
        self.forget_offscreen();
    }
}

fn dma_failed(e: platform::DmaError) -> BusError {
    warn!("descriptor chain build failed: {}", e);
    BusError::Dma(e)
}

/// Bit count for `bytes`, saturating at the register range.
fn bits_of(bytes: usize) -> u32 {
    u32::try_from(bytes.saturating_mul(8)).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::{DataLen, WaitPolicy};
    use platform::mocks::{BusEvent, SimBus, SimHost, SimRegisters};
    use platform::registers::SPI_USR_MOSI;

    fn bus(sim: &SimBus) -> RawBus<SimRegisters, SimHost> {
        let mut bus = RawBus::new(sim.registers(), sim.host(), WaitPolicy::default(), DataLen::Bits8);
        bus.regs.write(Reg::User, SPI_USR_MOSI);
        bus
    }

    #[test]
    fn pending_reset_runs_once_before_arming() {
        let sim = SimBus::new();
        let mut bus = bus(&sim);
        let mut dma = DmaEngine::new(1);
        dma.request_reset();
        let data = [0u8; 200];
        dma.write_linear(&mut bus, &data, Source::Caller).unwrap();
        dma.write_linear(&mut bus, &data, Source::Caller).unwrap();
        assert_eq!(sim.dma_resets(), 1);
        assert!(!dma.reset_pending());
        assert_eq!(sim.dma_kicks(), 2);
        let trace = sim.trace();
        assert_eq!(trace[0], BusEvent::DmaReset);
        assert!(matches!(
            trace[1],
            BusEvent::DmaWrite {
                bits: 1600,
                continuous: false,
                ..
            }
        ));
    }

    #[test]
    fn strided_source_must_cover_every_row() {
        let sim = SimBus::new();
        let mut bus = bus(&sim);
        let mut dma = DmaEngine::new(1);
        let data = [0u8; 100];
        let err = dma.write_strided(&mut bus, &data, 8, 4, 32).unwrap_err();
        assert_eq!(err, BusError::BufferTooSmall { needed: 104, got: 100 });
    }

    #[test]
    fn offscreen_ring_runs_continuous_until_stopped() {
        let sim = SimBus::new();
        let mut bus = bus(&sim);
        let mut dma = DmaEngine::new(2);
        assert!(!dma.draw_offscreen(&mut bus).unwrap());
        let rows = [[0u8; 8]; 3];
        let ptrs: std::vec::Vec<*const u8> = rows.iter().map(|r| r.as_ptr()).collect();
        dma.setup_scatter(&mut bus, &ptrs, 8, true).unwrap();
        assert_eq!(dma.chain().descriptors().len(), 3);
        assert!(dma.draw_offscreen(&mut bus).unwrap());
        assert!(matches!(
            sim.trace().last(),
            Some(BusEvent::DmaWrite {
                bits: 0,
                continuous: true,
                ..
            })
        ));
        assert!(dma.ring_running());
        dma.stop_offscreen(&mut bus);
        assert_ne!(sim.register(Reg::DmaConf) & SPI_DMA_TX_STOP, 0);
        assert_eq!(sim.dma_resets(), 1);
        assert!(!dma.ring_running());
        assert!(!dma.draw_offscreen(&mut bus).unwrap());
    }

    #[test]
    fn rebuilding_the_chain_drops_the_offscreen_setup() {
        let sim = SimBus::new();
        let mut bus = bus(&sim);
        let mut dma = DmaEngine::new(2);
        let rows = [[0u8; 8]; 2];
        let ptrs: std::vec::Vec<*const u8> = rows.iter().map(|r| r.as_ptr()).collect();
        let data = [0u8; 200];

        dma.setup_scatter(&mut bus, &ptrs, 8, false).unwrap();
        dma.write_linear(&mut bus, &data, Source::Caller).unwrap();
        assert!(!dma.draw_offscreen(&mut bus).unwrap());

        dma.setup_scatter(&mut bus, &ptrs, 8, false).unwrap();
        dma.write_strided(&mut bus, &data, 8, 2, 16).unwrap();
        assert!(!dma.draw_offscreen(&mut bus).unwrap());
    }
}
