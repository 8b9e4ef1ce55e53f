//! Window caching and solid fills
//!
//! Drives [`panelbus::PanelBus`] over the simulated controller and checks
//! the command frames that reach the wire.

#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing, clippy::unwrap_used)]

mod common;

use common::{addr, rig, rig_with, PANEL};
use panel_specs::{AddressWidth, ColorDepth, PanelSpec};
use panelbus::{BusConfig, DataLen};
use platform::mocks::BusEvent;

// ---------------------------------------------------------------------------
// Window cache
// ---------------------------------------------------------------------------

/// Addressing the same window twice only re-opens RAM writes.
#[test]
fn unchanged_window_sends_only_ramwr() {
    let (sim, mut lcd) = rig();
    let mut tx = lcd.transaction().unwrap();
    tx.set_window(0, 0, 9, 9).unwrap();
    sim.clear_trace();
    tx.set_window(0, 0, 9, 9).unwrap();
    drop(tx);
    assert_eq!(sim.commands(), vec![0x2C]);
}

/// A 1x1 fill followed by a 10x1 fill on the same row re-sends columns only.
#[test]
fn same_row_fill_resends_columns_only() {
    let (sim, mut lcd) = rig();
    lcd.set_color(0xFF_00_00);
    let mut tx = lcd.transaction().unwrap();
    tx.fill_rect(0, 0, 1, 1).unwrap();

    let frames = sim.frames();
    assert_eq!(frames.len(), 3);
    assert_eq!((frames[0].opcode, frames[0].data.clone()), (0x2A, addr(0, 0)));
    assert_eq!((frames[1].opcode, frames[1].data.clone()), (0x2B, addr(0, 0)));
    assert_eq!((frames[2].opcode, frames[2].data.clone()), (0x2C, vec![0xF8, 0x00]));

    sim.clear_trace();
    tx.fill_rect(0, 0, 10, 1).unwrap();
    drop(tx);

    let frames = sim.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!((frames[0].opcode, frames[0].data.clone()), (0x2A, addr(0, 9)));
    assert_eq!(frames[1].opcode, 0x2C);
    assert_eq!(frames[1].data, [0xF8, 0x00].repeat(10));
}

#[test]
fn rotation_forgets_the_cached_window() {
    let (sim, mut lcd) = rig();
    lcd.fill_rect(0, 0, 2, 2).unwrap();
    lcd.set_rotation(1).unwrap();
    assert_eq!(lcd.width(), 320);
    assert_eq!(lcd.height(), 240);

    sim.clear_trace();
    lcd.fill_rect(0, 0, 2, 2).unwrap();
    assert_eq!(sim.commands(), vec![0x2A, 0x2B, 0x2C]);
}

#[test]
fn depth_change_forgets_the_cached_window() {
    let (sim, mut lcd) = rig();
    lcd.fill_rect(0, 0, 2, 2).unwrap();
    assert_eq!(lcd.set_color_depth(ColorDepth::Rgb666).unwrap(), ColorDepth::Rgb666);
    let frames = sim.frames();
    assert_eq!(frames.last().map(|f| (f.opcode, f.data.clone())), Some((0x3A, vec![0x66])));

    sim.clear_trace();
    lcd.set_color(0xFF_FF_FF);
    lcd.fill_rect(0, 0, 2, 2).unwrap();
    let frames = sim.frames();
    assert_eq!(frames.iter().map(|f| f.opcode).collect::<Vec<_>>(), vec![0x2A, 0x2B, 0x2C]);
    assert_eq!(frames[2].data, [0xFC, 0xFC, 0xFC].repeat(4));
}

/// Unsupported depths fall back to RGB565.
#[test]
fn unsupported_depth_falls_back() {
    let (_sim, mut lcd) = rig();
    assert_eq!(lcd.set_color_depth(ColorDepth::Rgb888).unwrap(), ColorDepth::Rgb565);
    assert_eq!(lcd.color_depth(), ColorDepth::Rgb565);
}

#[test]
fn panel_offsets_shift_addresses() {
    let spec = PanelSpec {
        width: 135,
        height: 240,
        offset_x: 52,
        offset_y: 40,
        ..PANEL
    };
    let (sim, mut lcd) = rig_with(spec, BusConfig::default());
    lcd.draw_pixel(1, 2).unwrap();
    let frames = sim.frames();
    assert_eq!(frames[0].data, addr(53, 53));
    assert_eq!(frames[1].data, addr(42, 42));
}

#[test]
fn short_addresses_on_small_panels() {
    let spec = PanelSpec {
        width: 128,
        height: 128,
        address_width: AddressWidth::Bits16,
        ..PANEL
    };
    let (sim, mut lcd) = rig_with(spec, BusConfig::default());
    lcd.draw_pixel(3, 7).unwrap();
    let frames = sim.frames();
    assert_eq!(frames[0].data, vec![3, 3]);
    assert_eq!(frames[1].data, vec![7, 7]);
}

// ---------------------------------------------------------------------------
// Fills
// ---------------------------------------------------------------------------

/// A full-screen clear streams every pixel, yields between chunks and
/// keeps the drawing colour.
#[test]
fn clear_streams_the_whole_screen() {
    let (sim, mut lcd) = rig();
    lcd.set_color(0x00_00_FF);
    let raw = lcd.raw_color();
    lcd.clear().unwrap();

    let frames = sim.frames();
    let ramwr = frames.iter().find(|f| f.opcode == 0x2C).unwrap();
    assert_eq!(ramwr.data.len(), 240 * 320 * 2);
    assert!(ramwr.data.iter().all(|b| *b == 0));
    assert!(sim.yields() > 0);
    assert_eq!(lcd.raw_color(), raw);
}

/// Fills run on the fill divider; the next command is back on the write
/// divider.
#[test]
fn fills_switch_clock_and_back() {
    let (sim, mut lcd) = rig();
    let mut tx = lcd.transaction().unwrap();
    tx.fill_rect(0, 0, 100, 1).unwrap();
    tx.write_command(0x00).unwrap();
    drop(tx);

    let writes = sim.writes();
    let fill_clock = writes.iter().rev().find(|t| t.data).unwrap().clock;
    let cmd_clock = writes.last().unwrap().clock;
    assert_ne!(fill_clock, cmd_clock);
    assert_eq!(writes[0].clock, cmd_clock);
}

/// An APB change is picked up when the next transaction opens.
#[test]
fn apb_change_recomputes_dividers() {
    let (sim, mut lcd) = rig();
    lcd.write_command(0x00).unwrap();
    let before = sim.writes().last().unwrap().clock;

    sim.clear_trace();
    sim.set_apb_frequency(40_000_000);
    lcd.write_command(0x00).unwrap();
    let after = sim.writes().last().unwrap().clock;
    assert_ne!(before, after);
}

#[test]
fn empty_rectangles_touch_nothing() {
    let (sim, mut lcd) = rig();
    lcd.fill_rect(5, 5, 0, 10).unwrap();
    lcd.fill_rect(5, 5, 10, 0).unwrap();
    assert!(sim.trace().is_empty());
}

/// Without a panel every drawing call is a no-op.
#[test]
fn detached_driver_is_inert() {
    let sim = platform::mocks::SimBus::new();
    let mut lcd: common::Lcd = panelbus::PanelBus::new(
        sim.registers(),
        sim.host(),
        embedded_hal_mock::eh1::delay::NoopDelay::new(),
        BusConfig::default(),
    )
    .unwrap();
    lcd.fill_rect(0, 0, 10, 10).unwrap();
    lcd.draw_pixel(1, 1).unwrap();
    assert!(!lcd.command_list(&[0x11, 0]).unwrap());
    assert_eq!(lcd.width(), 0);
    assert!(!sim.trace().iter().any(|e| matches!(e, BusEvent::Acquire)));
}

/// 16-bit frames send each parameter as its low byte after a zero.
#[test]
fn wide_frames_put_params_high() {
    let config = BusConfig {
        data_len: DataLen::Bits16,
        ..BusConfig::default()
    };
    let (sim, mut lcd) = rig_with(PANEL, config);
    lcd.command_list(&[0x36, 1, 0x48, 0xFF, 0xFF]).unwrap();
    let frames = sim.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x36);
    assert_eq!(frames[0].data, vec![0x00, 0x48]);
}
