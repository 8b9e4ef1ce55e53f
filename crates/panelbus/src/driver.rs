//! Panel bus driver
//!
//! [`PanelBus`] ties one SPI controller ([`BusRegisters`] + [`Host`]) to one
//! attached [`Panel`]. It owns every piece of per-device state: the cached
//! window, clock dividers, the DMA engine and the staging pool, so a single
//! instance must only be driven from one thread of control.
//!
//! # Sessions
//!
//! Every drawing call needs the bus to be owned. Calls made outside an
//! explicit session open one for their own duration and close it on every
//! exit path; batching many calls inside [`PanelBus::start_write`] /
//! [`PanelBus::end_write`] (or a [`crate::Transaction`] guard) avoids the
//! per-call acquire/release.
//!
//! # Example
//!
//! ```
//! use embedded_hal_mock::eh1::delay::NoopDelay;
//! use panelbus::{BusConfig, PanelBus};
//! use panel_specs::{GenericPanel, PanelSpec};
//! use platform::mocks::SimBus;
//! # use panel_specs::{AddressWidth, ClockTargets, ColorDepth, DepthCodes, Opcodes};
//! # use platform::SpiMode;
//! # const SPEC: PanelSpec = PanelSpec {
//! #     name: "doc", width: 240, height: 320, offset_x: 0, offset_y: 0,
//! #     opcodes: Opcodes::MIPI_DCS, madctl: 0x36, rotation_table: [0; 8],
//! #     colmod: 0x3A,
//! #     depth_codes: DepthCodes { rgb332: None, rgb565: Some(0x55), rgb666: None, rgb888: None },
//! #     invon: 0x21, invoff: 0x20, reverse_invert: false, init_sequences: &[],
//! #     address_width: AddressWidth::Bits32, clocks: ClockTargets { write: 40_000_000, read: 16_000_000, fill: 40_000_000 },
//! #     spi_mode: SpiMode::Mode0, spi_mode_read: SpiMode::Mode0, spi_3wire: false,
//! #     spi_read: true, spi_cs: Some(5), spi_dc: Some(2),
//! #     dummy_read_pixel_bits: 8, dummy_read_rddid_bits: 1, read_depth: None,
//! #     default_depth: ColorDepth::Rgb565, default_rotation: 0, default_invert: false,
//! # };
//!
//! let sim = SimBus::new().with_control_pins(Some(2), Some(5));
//! let mut lcd = PanelBus::new(sim.registers(), sim.host(), NoopDelay::new(), BusConfig::default())?;
//! lcd.set_panel(GenericPanel::new(SPEC));
//! lcd.init()?;
//! lcd.set_color(0xFF_00_00);
//! lcd.fill_rect(10, 10, 20, 5)?;
//! # Ok::<(), panelbus::BusError>(())
//! ```

use embedded_hal::delay::DelayNs;
use panel_specs::{ColorConverter, ColorDepth, CommandList, Opcodes, Panel, PixelCopy};
use platform::registers::{
    BusRegisters, Reg, SPI_DMA_RESET_BITS, SPI_DOUTDIN, SPI_SLAVE_MODE, SPI_TRANS_DONE,
    SPI_USR_MISO, SPI_USR_MOSI,
};
use platform::{DescriptorChain, Host, PinMode, PinState};

use crate::bus::RawBus;
use crate::config::BusConfig;
use crate::dma::{DmaEngine, Source};
use crate::error::{BusError, ConfigError};
use crate::staging::StagingPool;
use crate::window::Window;

/// Settle time before each initialisation command list.
const INIT_SEQUENCE_DELAY_MS: u32 = 120;

/// SPI TFT panel driver.
pub struct PanelBus<R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    pub(crate) bus: RawBus<R, H>,
    pub(crate) delay: D,
    pub(crate) config: BusConfig,
    pub(crate) panel: Option<P>,
    pub(crate) window: Window,
    pub(crate) opcodes: Opcodes,
    width: u16,
    height: u16,
    pub(crate) write_conv: ColorConverter,
    pub(crate) read_conv: ColorConverter,
    pub(crate) raw_color: u32,
    rgb_color: u32,
    pub(crate) write_count: u32,
    pub(crate) begun: bool,
    pub(crate) dma: Option<DmaEngine>,
    pub(crate) staging: StagingPool,
}

impl<R, H, D, P> PanelBus<R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    /// Driver over `regs`/`host` with no panel attached yet.
    ///
    /// Fails with [`BusError::InvalidConfig`] if `config` does not validate.
    pub fn new(regs: R, host: H, delay: D, config: BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self {
            bus: RawBus::new(regs, host, config.wait, config.data_len),
            delay,
            config,
            panel: None,
            window: Window::default(),
            opcodes: Opcodes::default(),
            width: 0,
            height: 0,
            write_conv: ColorConverter::default(),
            read_conv: ColorConverter::default(),
            raw_color: 0,
            rgb_color: 0,
            write_count: 0,
            begun: false,
            dma: None,
            staging: StagingPool::new(),
        })
    }

    /// Bus configuration in use.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Panel attachment
    // -----------------------------------------------------------------------

    /// Attach `panel`, replacing any previous one.
    ///
    /// Drives DC and CS high as outputs and forgets every cached window
    /// extent and clock divider.
    pub fn set_panel(&mut self, panel: P) {
        self.panel = Some(panel);
        let Some(panel) = self.panel.as_ref() else {
            return;
        };
        let (dc, cs) = (panel.spi_dc(), panel.spi_cs());
        self.opcodes = panel.opcodes();
        self.bus.set_control_pins(dc, cs);
        for pin in [dc, cs].into_iter().flatten() {
            self.bus.host.set_pin(pin, PinState::High);
            self.bus.host.pin_mode(pin, PinMode::Output);
        }
        self.bus.clocks.invalidate();
        self.after_rotation();
        self.after_depth();
    }

    /// Attached panel.
    pub fn panel(&self) -> Option<&P> {
        self.panel.as_ref()
    }

    /// Attached panel, mutably. Geometry or depth changed through this
    /// handle are not seen by the driver until the next `set_*` call.
    pub fn panel_mut(&mut self) -> Option<&mut P> {
        self.panel.as_mut()
    }

    pub(crate) fn attached(&self) -> bool {
        self.panel.is_some()
    }

    fn after_rotation(&mut self) {
        if let Some(panel) = self.panel.as_ref() {
            self.width = panel.width();
            self.height = panel.height();
            self.window = Window::from_panel(panel);
        }
    }

    fn after_depth(&mut self) {
        if let Some(panel) = self.panel.as_ref() {
            self.write_conv = ColorConverter::new(panel.write_depth());
            self.read_conv = ColorConverter::new(panel.read_depth());
            self.raw_color = self.write_conv.encode(self.rgb_color);
        }
        self.window.invalidate();
    }

    // -----------------------------------------------------------------------
    // Bring-up
    // -----------------------------------------------------------------------

    /// Bus, panel, blank screen, and a window at the origin.
    pub fn init(&mut self) -> Result<(), BusError> {
        self.init_bus()?;
        self.init_panel()?;
        self.with_write(|s| {
            s.clear()?;
            s.set_window(0, 0, 0, 0)
        })
    }

    /// Route the bus pins, bring up the controller and, when configured,
    /// reset the DMA module.
    pub fn init_bus(&mut self) -> Result<(), BusError> {
        let pins = self.config.pins();
        for (pin, mode) in [
            (pins.mosi, PinMode::Output),
            (pins.miso, PinMode::Input),
            (pins.sclk, PinMode::Output),
        ] {
            if let Some(pin) = pin {
                self.bus.host.pin_mode(pin, mode);
            }
        }
        self.bus.host.init_bus(&pins).map_err(|e| {
            error!("SPI bus init failed: {}", e);
            BusError::Host(e)
        })?;

        if self.init_dma() {
            let regs = &mut self.bus.regs;
            regs.set_bits(Reg::DmaConf, SPI_DMA_RESET_BITS);
            regs.write(Reg::DmaInLink, 0);
            regs.clear_bits(Reg::DmaConf, SPI_DMA_RESET_BITS);
            regs.write(Reg::DmaOutLink, 0);
        }

        let regs = &mut self.bus.regs;
        regs.write(Reg::User, SPI_USR_MOSI | SPI_USR_MISO | SPI_DOUTDIN);
        regs.write(Reg::Ctrl, 0);
        regs.write(Reg::Ctrl2, 0);
        regs.clear_bits(Reg::Slave, SPI_SLAVE_MODE | SPI_TRANS_DONE);
        regs.write(Reg::Ctrl1, 0);
        Ok(())
    }

    /// Return the pins to plain outputs and hand the controller back.
    ///
    /// Off-screen output is stopped and the staging buffers are freed once
    /// no transfer can still be reading them.
    pub fn release_bus(&mut self) {
        match self.quiesce_dma() {
            Ok(()) => self.staging.release(),
            Err(e) => warn!("staging buffers kept, DMA still busy: {}", e),
        }
        let pins = self.config.pins();
        for pin in [pins.sclk, pins.miso, pins.mosi].into_iter().flatten() {
            self.bus.host.pin_mode(pin, PinMode::Output);
        }
        self.bus.host.deinit_bus(self.config.host);
    }

    /// Run the panel's bring-up hook and initialisation lists, then apply
    /// its inversion, depth and rotation.
    pub fn init_panel(&mut self) -> Result<(), BusError> {
        let Some(panel) = self.panel.as_mut() else {
            return Ok(());
        };
        panel.init();
        self.with_write(|s| {
            for index in 0usize.. {
                let Some(cmds) = s.panel.as_ref().and_then(|p| p.init_commands(index)) else {
                    break;
                };
                debug!("panel init sequence {}", index);
                s.delay.delay_ms(INIT_SEQUENCE_DELAY_MS);
                s.bus.cs_l();
                send_list(&mut s.bus, &mut s.delay, cmds)?;
                s.bus.wait_idle()?;
                s.bus.cs_h();
            }
            s.bus.cs_l();
            let Some(panel) = s.panel.as_ref() else {
                return Ok(());
            };
            let (invert, depth, rotation) = (panel.invert(), panel.write_depth(), panel.rotation());
            s.invert_display(invert)?;
            s.set_color_depth(depth)?;
            s.set_rotation(rotation)?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Send one command byte.
    pub fn write_command(&mut self, cmd: u8) -> Result<(), BusError> {
        if !self.attached() {
            return Ok(());
        }
        self.with_write(|s| s.bus.write_cmd(cmd))
    }

    /// Send one parameter byte.
    pub fn write_data(&mut self, data: u8) -> Result<(), BusError> {
        if !self.attached() {
            return Ok(());
        }
        self.with_write(|s| s.bus.write_param(data))
    }

    /// Send an encoded command list (see [`panel_specs::command`]).
    ///
    /// Returns `Ok(false)` if the list was cut short in the middle of an
    /// entry (everything before it is sent) or no panel is attached.
    pub fn command_list(&mut self, cmds: &[u8]) -> Result<bool, BusError> {
        if !self.attached() {
            return Ok(false);
        }
        self.with_write(|s| send_list(&mut s.bus, &mut s.delay, cmds))
    }

    /// Enter sleep.
    pub fn sleep(&mut self) -> Result<(), BusError> {
        self.write_command(self.opcodes.slpin)
    }

    /// Leave sleep.
    pub fn wakeup(&mut self) -> Result<(), BusError> {
        self.write_command(self.opcodes.slpout)
    }

    /// Byte `index` of the response to `cmd`.
    #[allow(clippy::cast_possible_truncation)] // Safety: only the low byte was clocked in
    pub fn read_command8(&mut self, cmd: u8, index: u8) -> Result<u8, BusError> {
        Ok(self.read_command(cmd, u32::from(index).saturating_mul(8), 8)? as u8)
    }

    /// Bytes `index..index + 2` of the response to `cmd`, first byte most significant.
    #[allow(clippy::cast_possible_truncation)] // Safety: only the low half was clocked in
    pub fn read_command16(&mut self, cmd: u8, index: u8) -> Result<u16, BusError> {
        Ok((self.read_command(cmd, u32::from(index).saturating_mul(8), 16)? as u16).swap_bytes())
    }

    /// Bytes `index..index + 4` of the response to `cmd`, first byte most significant.
    pub fn read_command32(&mut self, cmd: u8, index: u8) -> Result<u32, BusError> {
        Ok(self.read_command(cmd, u32::from(index).saturating_mul(8), 32)?.swap_bytes())
    }

    /// Raw identification word (first byte received in the low byte).
    pub fn read_panel_id(&mut self) -> Result<u32, BusError> {
        let Some(dummy) = self.panel.as_ref().map(Panel::dummy_read_rddid_bits) else {
            return Ok(0);
        };
        self.read_command(self.opcodes.rddid, dummy, 32)
    }

    fn read_command(&mut self, cmd: u8, skip_bits: u32, bits: u32) -> Result<u32, BusError> {
        let Some(params) = self.read_params() else {
            return Ok(0);
        };
        self.with_write(|s| {
            s.bus.write_cmd(cmd)?;
            params.start(&mut s.bus)?;
            let value = if skip_bits == 0 {
                s.bus.read_data(bits)
            } else {
                s.bus.read_data(skip_bits).and_then(|_| s.bus.read_data(bits))
            };
            let end = params.end(&mut s.bus);
            let value = value?;
            end?;
            Ok(value)
        })
    }

    // -----------------------------------------------------------------------
    // Panel state
    // -----------------------------------------------------------------------

    /// Switch the panel's pixel format. Returns the depth actually applied,
    /// which may differ when the panel does not support `depth`.
    pub fn set_color_depth(&mut self, depth: ColorDepth) -> Result<ColorDepth, BusError> {
        let Some(panel) = self.panel.as_mut() else {
            return Ok(self.write_conv.depth);
        };
        let cmds = panel.color_depth_commands(depth);
        self.after_depth();
        if !cmds.is_empty() {
            self.command_list(cmds.as_bytes())?;
        }
        Ok(self.write_conv.depth)
    }

    /// Rotate the panel (0-3, 4-7 mirrored).
    pub fn set_rotation(&mut self, rotation: u8) -> Result<(), BusError> {
        let Some(panel) = self.panel.as_mut() else {
            return Ok(());
        };
        let cmds = panel.rotation_commands(rotation);
        self.after_rotation();
        if !cmds.is_empty() {
            self.command_list(cmds.as_bytes())?;
        }
        Ok(())
    }

    /// Turn colour inversion on or off.
    pub fn invert_display(&mut self, invert: bool) -> Result<(), BusError> {
        let Some(panel) = self.panel.as_mut() else {
            return Ok(());
        };
        let cmds = panel.invert_commands(invert);
        if !cmds.is_empty() {
            self.command_list(cmds.as_bytes())?;
        }
        Ok(())
    }

    /// Forward a backlight level to the panel.
    pub fn set_brightness(&mut self, brightness: u8) {
        if let Some(panel) = self.panel.as_mut() {
            panel.set_brightness(brightness);
        }
    }

    /// Current write format.
    pub fn color_depth(&self) -> ColorDepth {
        self.write_conv.depth
    }

    /// Current rotation.
    pub fn rotation(&self) -> u8 {
        self.panel.as_ref().map_or(0, Panel::rotation)
    }

    /// The attached panel can be read back.
    pub fn is_readable(&self) -> bool {
        self.panel.as_ref().is_some_and(Panel::spi_read)
    }

    /// Width at the current rotation; 0 with no panel.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Height at the current rotation; 0 with no panel.
    pub fn height(&self) -> u16 {
        self.height
    }

    // -----------------------------------------------------------------------
    // Colour
    // -----------------------------------------------------------------------

    /// Drawing colour as `0xRRGGBB`, converted to the current write format.
    pub fn set_color(&mut self, rgb888: u32) {
        self.rgb_color = rgb888;
        self.raw_color = self.write_conv.encode(rgb888);
    }

    /// Drawing colour as a wire value in the current write format.
    pub fn set_raw_color(&mut self, raw: u32) {
        self.raw_color = raw;
        self.rgb_color = self.write_conv.decode(raw);
    }

    /// Drawing colour as a wire value.
    pub fn raw_color(&self) -> u32 {
        self.raw_color
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    /// Address `(xs, ys)..=(xe, ye)` and open RAM for writing.
    pub fn set_window(&mut self, xs: u16, ys: u16, xe: u16, ye: u16) -> Result<(), BusError> {
        if !self.attached() {
            return Ok(());
        }
        self.with_write(|s| s.address_for_write(xs, ys, xe, ye))
    }

    pub(crate) fn address_for_write(
        &mut self,
        xs: u16,
        ys: u16,
        xe: u16,
        ye: u16,
    ) -> Result<(), BusError> {
        self.bus.leave_fill_mode()?;
        self.window.set(&mut self.bus, xs, ys, xe, ye)?;
        self.bus.write_cmd(self.opcodes.ramwr)
    }

    /// One pixel in the drawing colour. Coordinates are not clipped.
    pub fn draw_pixel(&mut self, x: u16, y: u16) -> Result<(), BusError> {
        if !self.attached() {
            return Ok(());
        }
        self.with_write(|s| {
            s.address_for_write(x, y, x, y)?;
            let bits = u32::from(s.write_conv.bits);
            s.bus.write_data(s.raw_color, bits)
        })
    }

    /// Rectangle in the drawing colour. Coordinates are not clipped.
    pub fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16) -> Result<(), BusError> {
        self.fill_rect_raw(x, y, w, h, self.raw_color)
    }

    fn fill_rect_raw(&mut self, x: u16, y: u16, w: u16, h: u16, raw: u32) -> Result<(), BusError> {
        if w == 0 || h == 0 || !self.attached() {
            return Ok(());
        }
        let xe = x.saturating_add(w.saturating_sub(1));
        let ye = y.saturating_add(h.saturating_sub(1));
        self.with_write(|s| {
            s.address_for_write(x, y, xe, ye)?;
            let count = u32::from(w).saturating_mul(u32::from(h));
            let fill = s.bus.clocks.fill_differs();
            s.bus.push_block(raw, s.write_conv.bytes, count, fill)
        })
    }

    /// `count` pixels of the drawing colour into the current window.
    pub fn push_block(&mut self, count: u32) -> Result<(), BusError> {
        if !self.attached() {
            return Ok(());
        }
        self.with_write(|s| {
            let fill = s.bus.clocks.fill_differs();
            s.bus.push_block(s.raw_color, s.write_conv.bytes, count, fill)
        })
    }

    /// Fill the whole screen with wire value 0 (black). The drawing colour
    /// is kept.
    pub fn clear(&mut self) -> Result<(), BusError> {
        self.fill_rect_raw(0, 0, self.width, self.height, 0)
    }

    /// `count` pixels from `src` into the current window. `src` must produce
    /// the current write format.
    pub fn write_pixels<S: PixelCopy + ?Sized>(
        &mut self,
        count: usize,
        src: &mut S,
    ) -> Result<(), BusError> {
        if !self.attached() {
            return Ok(());
        }
        self.with_write(|s| {
            s.bus.leave_fill_mode()?;
            s.bus.write_pixels(count, s.write_conv.bytes, src)
        })
    }

    /// Wire-format bytes into the current window, through DMA when
    /// available. Returns once the transfer has completed.
    pub fn write_pixels_dma(&mut self, data: &[u8]) -> Result<(), BusError> {
        if !self.attached() {
            return Ok(());
        }
        self.with_write(|s| {
            s.bus.leave_fill_mode()?;
            s.bus.write_bytes(s.dma.as_mut(), data, true, Source::Caller)
        })
    }

    // -----------------------------------------------------------------------
    // DMA
    // -----------------------------------------------------------------------

    /// Create the DMA engine if a channel is configured. Returns whether DMA
    /// is available.
    pub fn init_dma(&mut self) -> bool {
        if self.dma.is_none() && self.config.dma_enabled() {
            debug!("DMA enabled on channel {}", self.config.dma_channel);
            self.dma = Some(DmaEngine::new(self.config.dma_channel));
        }
        self.dma.is_some()
    }

    /// Block until any transfer in flight has finished.
    pub fn wait_dma(&mut self) -> Result<(), BusError> {
        self.bus.wait_idle()
    }

    /// A transfer is in flight.
    pub fn dma_busy(&self) -> bool {
        self.bus.regs.is_busy()
    }

    /// Descriptors of the most recent DMA transfer.
    pub fn dma_chain(&self) -> Option<&DescriptorChain> {
        self.dma.as_ref().map(DmaEngine::chain)
    }

    /// Driver-owned staging buffers.
    pub fn staging(&self) -> &StagingPool {
        &self.staging
    }

    /// Prepare a `w` x `h` off-screen frame made of `rows` row pointers,
    /// each holding `w` pixels in the current write format. With `endless`
    /// the last row links back to the first.
    ///
    /// # Safety
    ///
    /// Every pointer in `rows[..h]` must be valid for reads of one row
    /// until [`Self::stop_offscreen_dma`] returns or the chain has run to
    /// its end. The DMA engine reads them without the borrow checker's help.
    pub unsafe fn setup_offscreen_dma(
        &mut self,
        rows: &[*const u8],
        w: u16,
        h: u16,
        endless: bool,
    ) -> Result<(), BusError> {
        if self.dma.is_none() {
            return Err(BusError::InvalidConfig(ConfigError::DmaChannel(0)));
        }
        if w == 0 || h == 0 || !self.attached() {
            return Ok(());
        }
        let rows = rows.get(..usize::from(h)).ok_or(BusError::BufferTooSmall {
            needed: usize::from(h),
            got: rows.len(),
        })?;
        let row_len = usize::from(w).saturating_mul(usize::from(self.write_conv.bytes));
        self.with_write(|s| {
            s.address_for_write(0, 0, w.saturating_sub(1), h.saturating_sub(1))?;
            match s.dma.as_mut() {
                Some(dma) => dma.setup_scatter(&mut s.bus, rows, row_len, endless),
                None => Ok(()),
            }
        })
    }

    /// Start the prepared off-screen chain.
    ///
    /// Must be called inside an explicit session ([`Self::start_write`] or
    /// [`Self::transaction`]): the bus has to stay owned for as long as the
    /// chain runs. Returns `Ok(false)` when nothing was prepared or no
    /// session is open.
    pub fn draw_offscreen_dma(&mut self) -> Result<bool, BusError> {
        if !self.begun {
            warn!("off-screen draw outside a write session ignored");
            return Ok(false);
        }
        match self.dma.as_mut() {
            Some(dma) => dma.draw_offscreen(&mut self.bus),
            None => Ok(false),
        }
    }

    /// Halt off-screen output. The prepared chain is discarded.
    pub fn stop_offscreen_dma(&mut self) {
        if let Some(dma) = self.dma.as_mut() {
            dma.stop_offscreen(&mut self.bus);
        }
    }

    /// Stop an endless ring, or wait out any other transfer still in flight.
    fn quiesce_dma(&mut self) -> Result<(), BusError> {
        match self.dma.as_mut() {
            Some(dma) if dma.ring_running() => {
                dma.stop_offscreen(&mut self.bus);
                Ok(())
            }
            Some(_) => self.bus.wait_idle(),
            None => Ok(()),
        }
    }
}

impl<R, H, D, P> Drop for PanelBus<R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    fn drop(&mut self) {
        if self.quiesce_dma().is_err() {
            warn!("dropping panel bus with a DMA transfer still running");
        }
    }
}

/// Send a command list with the write clock selected.
fn send_list<R: BusRegisters, H: Host, D: DelayNs>(
    bus: &mut RawBus<R, H>,
    delay: &mut D,
    cmds: &[u8],
) -> Result<bool, BusError> {
    bus.fill_mode = false;
    bus.wait_idle()?;
    bus.write_clock();
    let mut list = CommandList::new(cmds);
    for cmd in list.by_ref() {
        bus.write_cmd(cmd.opcode)?;
        for arg in cmd.args {
            bus.write_param(*arg)?;
        }
        if let Some(ms) = cmd.delay_ms {
            bus.wait_idle()?;
            delay.delay_ms(u32::from(ms));
        }
    }
    if list.is_truncated() {
        warn!("command list truncated after {} bytes", cmds.len());
        return Ok(false);
    }
    Ok(true)
}
