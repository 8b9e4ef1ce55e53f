//! Transaction controller
//!
//! A transaction is the span during which this driver owns the bus: CS is
//! asserted, the write-mode USER/PIN configuration and write clock are
//! loaded. [`PanelBus::start_write`] / [`PanelBus::end_write`] nest by
//! reference count; only the outermost pair touches the bus. Reads switch
//! the controller into read mode inside an open transaction and back out.

use core::ops::{Deref, DerefMut};

use embedded_hal::delay::DelayNs;
use panel_specs::Panel;
use platform::registers::{
    BusRegisters, Reg, SPI_CK_IDLE_EDGE, SPI_CK_OUT_EDGE, SPI_DOUTDIN, SPI_SIO, SPI_USR_MISO,
    SPI_USR_MOSI,
};
use platform::{Host, SpiMode};

use crate::bus::RawBus;
use crate::driver::PanelBus;
use crate::error::BusError;

/// No-operation command used to release panels without a CS line.
const NOP: u8 = 0x00;

/// USER and PIN register values for one SPI mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModeRegs {
    user: u32,
    pin: u32,
}

impl ModeRegs {
    fn new(mode: SpiMode, base: u32) -> Self {
        let user = if mode.ck_out_edge() {
            base | SPI_CK_OUT_EDGE
        } else {
            base
        };
        let pin = if mode.cpol() { SPI_CK_IDLE_EDGE } else { 0 };
        Self { user, pin }
    }

    fn load<R: BusRegisters, H: Host>(self, bus: &mut RawBus<R, H>) {
        bus.regs.write(Reg::User, self.user);
        bus.regs.write(Reg::Pin, self.pin);
    }
}

/// Snapshot of what a read needs from the panel, taken before the bus is
/// borrowed for the transfer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadParams {
    read: ModeRegs,
    write: ModeRegs,
    /// Dummy clocks before pixel data.
    pub(crate) dummy_bits: u32,
}

impl ReadParams {
    /// Switch to read mode: DC high, read edges, read clock.
    pub(crate) fn start<R: BusRegisters, H: Host>(
        &self,
        bus: &mut RawBus<R, H>,
    ) -> Result<(), BusError> {
        bus.fill_mode = false;
        bus.dc_h()?;
        self.read.load(bus);
        bus.read_clock();
        Ok(())
    }

    /// Back to write mode with CS pulsed so the panel leaves read state.
    pub(crate) fn end<R: BusRegisters, H: Host>(
        &self,
        bus: &mut RawBus<R, H>,
    ) -> Result<(), BusError> {
        bus.wait_idle()?;
        bus.cs_h();
        self.write.load(bus);
        if !bus.has_cs() {
            bus.write_cmd(NOP)?;
        }
        bus.write_clock();
        bus.fill_mode = false;
        bus.cs_l();
        Ok(())
    }
}

impl<R, H, D, P> PanelBus<R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    // -----------------------------------------------------------------------
    // Bus ownership
    // -----------------------------------------------------------------------

    /// Take the bus and load the write configuration. Does nothing while a
    /// transaction is already open or when no panel is attached.
    pub fn begin_transaction(&mut self) -> Result<(), BusError> {
        if self.begun {
            return Ok(());
        }
        let Some(panel) = self.panel.as_ref() else {
            return Ok(());
        };
        let mode = ModeRegs::new(panel.spi_mode(), SPI_USR_MOSI);
        let targets = panel.clocks();

        self.bus.fill_mode = false;
        let apb = self.bus.host.apb_frequency();
        if self.bus.clocks.refresh(apb, targets) {
            debug!("clock dividers recomputed for APB {} Hz", apb);
        }
        self.bus.host.acquire_bus(self.config.host).map_err(|e| {
            error!("acquiring SPI bus failed: {}", e);
            BusError::Host(e)
        })?;
        self.begun = true;
        if let Some(dma) = self.dma.as_mut() {
            dma.request_reset();
        }
        mode.load(&mut self.bus);
        self.bus.write_clock();
        self.bus.cs_l();
        Ok(())
    }

    /// Deselect the panel and hand the bus back. Does nothing outside a
    /// transaction. The bus is released even if the final wait fails.
    pub fn end_transaction(&mut self) -> Result<(), BusError> {
        if !self.begun {
            return Ok(());
        }
        self.begun = false;
        let nop = if self.bus.has_cs() {
            Ok(())
        } else {
            self.bus.write_cmd(NOP)
        };
        let dc = self.bus.dc_h();
        self.bus.cs_h();
        self.bus
            .regs
            .write(Reg::User, SPI_USR_MOSI | SPI_USR_MISO | SPI_DOUTDIN);
        self.bus.host.release_bus(self.config.host);
        nop.and(dc)
    }

    /// A transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.begun
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Open (or nest into) a write session.
    pub fn start_write(&mut self) -> Result<(), BusError> {
        self.write_count = self.write_count.saturating_add(1);
        if self.write_count == 1 {
            if let Err(e) = self.begin_transaction() {
                self.write_count = 0;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Leave a write session; the outermost call ends the transaction.
    /// Unbalanced calls are ignored.
    pub fn end_write(&mut self) -> Result<(), BusError> {
        match self.write_count {
            0 => Ok(()),
            1 => {
                self.write_count = 0;
                self.end_transaction()
            }
            _ => {
                self.write_count = self.write_count.saturating_sub(1);
                Ok(())
            }
        }
    }

    /// Scoped session: ends when the guard is dropped.
    pub fn transaction(&mut self) -> Result<Transaction<'_, R, H, D, P>, BusError> {
        self.start_write()?;
        Ok(Transaction { lcd: self })
    }

    /// Run `f` inside a session, closing it on every exit path.
    pub(crate) fn with_write<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        self.start_write()?;
        let result = f(self);
        let end = self.end_write();
        let value = result?;
        end?;
        Ok(value)
    }

    pub(crate) fn read_params(&self) -> Option<ReadParams> {
        let panel = self.panel.as_ref()?;
        let mut read_base = SPI_USR_MISO;
        if panel.spi_3wire() {
            read_base |= SPI_SIO;
        }
        Some(ReadParams {
            read: ModeRegs::new(panel.spi_mode_read(), read_base),
            write: ModeRegs::new(panel.spi_mode(), SPI_USR_MOSI),
            dummy_bits: panel.dummy_read_pixel_bits(),
        })
    }
}

/// Open write session; ends the session on drop.
///
/// Dereferences to the driver, so drawing calls made through the guard
/// skip the per-call bus acquisition.
pub struct Transaction<'a, R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    lcd: &'a mut PanelBus<R, H, D, P>,
}

impl<R, H, D, P> Deref for Transaction<'_, R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    type Target = PanelBus<R, H, D, P>;

    fn deref(&self) -> &Self::Target {
        self.lcd
    }
}

impl<R, H, D, P> DerefMut for Transaction<'_, R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.lcd
    }
}

impl<R, H, D, P> Drop for Transaction<'_, R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    fn drop(&mut self) {
        if let Err(e) = self.lcd.end_write() {
            warn!("closing panel transaction failed: {}", e);
        }
    }
}
