//! Shared rig for the panelbus integration suites: a 240x320 MIPI DCS panel
//! on DC=2 / CS=5 driven through the simulated register bank.

#![allow(dead_code)]

use embedded_hal_mock::eh1::delay::NoopDelay;
use panel_specs::{
    AddressWidth, ClockTargets, ColorDepth, DepthCodes, GenericPanel, Opcodes, PanelSpec,
};
use panelbus::{BusConfig, PanelBus};
use platform::mocks::{SimBus, SimHost, SimRegisters};
use platform::SpiMode;

pub type Lcd = PanelBus<SimRegisters, SimHost, NoopDelay, GenericPanel>;

pub const DC: u8 = 2;
pub const CS: u8 = 5;

/// Software reset, sleep out, display on.
pub const INIT: &[u8] = &[0x01, 0x80, 5, 0x11, 0x80, 10, 0x29, 0, 0xFF, 0xFF];

pub const PANEL: PanelSpec = PanelSpec {
    name: "test-240x320",
    width: 240,
    height: 320,
    offset_x: 0,
    offset_y: 0,
    opcodes: Opcodes::MIPI_DCS,
    madctl: 0x36,
    rotation_table: [0x08, 0x68, 0xC8, 0xA8, 0x09, 0x69, 0xC9, 0xA9],
    colmod: 0x3A,
    depth_codes: DepthCodes {
        rgb332: None,
        rgb565: Some(0x55),
        rgb666: Some(0x66),
        rgb888: None,
    },
    invon: 0x21,
    invoff: 0x20,
    reverse_invert: false,
    init_sequences: &[INIT],
    address_width: AddressWidth::Bits32,
    clocks: ClockTargets {
        write: 40_000_000,
        read: 16_000_000,
        fill: 80_000_000,
    },
    spi_mode: SpiMode::Mode0,
    spi_mode_read: SpiMode::Mode0,
    spi_3wire: false,
    spi_read: true,
    spi_cs: Some(CS),
    spi_dc: Some(DC),
    dummy_read_pixel_bits: 8,
    dummy_read_rddid_bits: 1,
    read_depth: Some(ColorDepth::Rgb666),
    default_depth: ColorDepth::Rgb565,
    default_rotation: 0,
    default_invert: false,
};

/// Driver for `spec` with `config`, panel attached, trace empty.
pub fn rig_with(spec: PanelSpec, config: BusConfig) -> (SimBus, Lcd) {
    let sim = SimBus::new().with_control_pins(spec.spi_dc, spec.spi_cs);
    let mut lcd = PanelBus::new(sim.registers(), sim.host(), NoopDelay::new(), config).unwrap();
    lcd.set_panel(GenericPanel::new(spec));
    sim.clear_trace();
    (sim, lcd)
}

/// Default panel, no DMA.
pub fn rig() -> (SimBus, Lcd) {
    rig_with(PANEL, BusConfig::default())
}

/// Default panel on DMA channel 1, engine created.
pub fn dma_rig() -> (SimBus, Lcd) {
    let config = BusConfig {
        dma_channel: 1,
        ..BusConfig::default()
    };
    let (sim, mut lcd) = rig_with(PANEL, config);
    assert!(lcd.init_dma());
    (sim, lcd)
}

/// Window payload for `[start, end]` on a 32-bit address panel.
pub fn addr(start: u16, end: u16) -> Vec<u8> {
    let [s1, s0] = start.to_be_bytes();
    let [e1, e0] = end.to_be_bytes();
    vec![s1, s0, e1, e0]
}
