//! Image blits, DMA transfers and the off-screen ring
//!
//! Descriptor chains are inspected through [`panelbus::PanelBus::dma_chain`];
//! the simulated controller records each DMA kick with its bit count.

#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing, clippy::unwrap_used)]

mod common;

use common::{addr, dma_rig, rig, Lcd};
use panel_specs::{ColorDepth, ImageSource};
use panelbus::{BusError, ConfigError};
use platform::mocks::BusEvent;
use platform::registers::SPI_DMA_TX_STOP;
use platform::Reg;

/// `w` x `h` RGB565 image whose pixel at (x, y) is `y * w + x`.
fn numbered(w: usize, h: usize) -> Vec<u8> {
    (0..w * h).flat_map(|i| (i as u16).to_be_bytes()).collect()
}

fn dma_writes(trace: &[BusEvent]) -> Vec<(u32, bool)> {
    trace
        .iter()
        .filter_map(|e| match e {
            BusEvent::DmaWrite {
                bits, continuous, ..
            } => Some((*bits, *continuous)),
            _ => None,
        })
        .collect()
}

/// Bytes behind descriptor `index` of the latest chain.
fn chain_bytes(lcd: &Lcd, index: usize) -> Vec<u8> {
    let desc = &lcd.dma_chain().unwrap().descriptors()[index];
    // SAFETY: staged chains point into the driver's staging buffers, which
    // live as long as `lcd`.
    unsafe { std::slice::from_raw_parts(desc.buffer(), desc.len()) }.to_vec()
}

// ---------------------------------------------------------------------------
// CPU blits
// ---------------------------------------------------------------------------

#[test]
fn raw_image_goes_out_unchanged() {
    let (sim, mut lcd) = rig();
    let data = numbered(8, 8);
    let mut src = ImageSource::new(&data, 8, ColorDepth::Rgb565, ColorDepth::Rgb565);
    lcd.push_image(0, 0, 8, 8, &mut src).unwrap();

    let frames = sim.frames();
    assert_eq!(frames[0].data, addr(0, 7));
    assert_eq!(frames[2].opcode, 0x2C);
    assert_eq!(frames[2].data, data);
}

/// A sub-rectangle of a wider image is sent row by row.
#[test]
fn sub_image_rows_follow_the_source_stride() {
    let (sim, mut lcd) = rig();
    let data = numbered(16, 16);
    let mut src =
        ImageSource::new(&data, 16, ColorDepth::Rgb565, ColorDepth::Rgb565).with_origin(2, 3);
    lcd.push_image(0, 0, 4, 2, &mut src).unwrap();

    let expected: Vec<u8> = [3 * 16 + 2, 4 * 16 + 2]
        .iter()
        .flat_map(|start: &u16| (*start..start + 4).flat_map(u16::to_be_bytes))
        .collect();
    assert_eq!(sim.frames()[2].data, expected);
}

#[test]
fn converted_image_is_streamed() {
    let (sim, mut lcd) = rig();
    let data = [0xFF, 0x00, 0x00].repeat(8);
    let mut src = ImageSource::new(&data, 4, ColorDepth::Rgb888, ColorDepth::Rgb565);
    lcd.push_image(10, 10, 4, 2, &mut src).unwrap();

    let frames = sim.frames();
    assert_eq!(frames[0].data, addr(10, 13));
    assert_eq!(frames[1].data, addr(10, 11));
    assert_eq!(frames[2].data, [0xF8, 0x00].repeat(8));
}

/// Transparent pixels split a row into one window per opaque run.
#[test]
fn transparent_pixels_are_skipped() {
    let (sim, mut lcd) = rig();
    let data = [0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x03];
    let mut src =
        ImageSource::new(&data, 5, ColorDepth::Rgb565, ColorDepth::Rgb565).with_transparent(0);
    lcd.push_image(0, 0, 5, 1, &mut src).unwrap();

    let got: Vec<(u8, Vec<u8>)> = sim.frames().into_iter().map(|f| (f.opcode, f.data)).collect();
    assert_eq!(
        got,
        vec![
            (0x2A, addr(0, 0)),
            (0x2B, addr(0, 0)),
            (0x2C, vec![0x00, 0x01]),
            (0x2A, addr(3, 4)),
            (0x2C, vec![0x00, 0x02, 0x00, 0x03]),
        ]
    );
}

#[test]
fn fully_transparent_image_sends_nothing() {
    let (sim, mut lcd) = rig();
    let data = [0u8; 8];
    let mut src =
        ImageSource::new(&data, 4, ColorDepth::Rgb565, ColorDepth::Rgb565).with_transparent(0);
    lcd.push_image(0, 0, 4, 1, &mut src).unwrap();
    assert!(sim.writes().is_empty());
}

// ---------------------------------------------------------------------------
// DMA from caller memory
// ---------------------------------------------------------------------------

/// A 4x4 window of a 16x16 image goes out as four 8-byte descriptors whose
/// buffers are one source row apart.
#[test]
fn strided_blit_builds_one_descriptor_per_row() {
    let (sim, mut lcd) = dma_rig();
    let data = numbered(16, 16);
    let mut src =
        ImageSource::new(&data, 16, ColorDepth::Rgb565, ColorDepth::Rgb565).with_origin(2, 3);
    lcd.push_image_dma(0, 0, 4, 4, &mut src).unwrap();

    let chain = lcd.dma_chain().unwrap();
    let descs = chain.descriptors();
    assert_eq!(descs.len(), 4);
    let first = data.as_ptr().wrapping_add(3 * 32 + 2 * 2);
    for (i, d) in descs.iter().enumerate() {
        assert_eq!(d.len(), 8);
        assert_eq!(d.buffer(), first.wrapping_add(i * 32));
        assert_eq!(d.is_eof(), i == 3);
    }
    assert_eq!(dma_writes(&sim.trace()), vec![(256, false)]);
    assert_eq!(sim.dma_resets(), 1);
}

#[test]
fn full_width_blit_is_one_linear_chain() {
    let (sim, mut lcd) = dma_rig();
    let data = numbered(20, 20);
    let mut src = ImageSource::new(&data, 20, ColorDepth::Rgb565, ColorDepth::Rgb565);
    lcd.push_image_dma(0, 0, 20, 20, &mut src).unwrap();

    let descs = lcd.dma_chain().unwrap().descriptors();
    assert_eq!(descs.len(), 1);
    assert_eq!(descs[0].buffer(), data.as_ptr());
    assert_eq!(descs[0].len(), 800);
    assert_eq!(dma_writes(&sim.trace()), vec![(6400, false)]);
}

/// Mid-sized blits without the DMA flag are copied into staging memory and
/// sent from there.
#[test]
fn mid_sized_blit_is_staged() {
    let (sim, mut lcd) = dma_rig();
    let data = numbered(8, 8);
    let mut src = ImageSource::new(&data, 8, ColorDepth::Rgb565, ColorDepth::Rgb565);
    lcd.push_image(0, 0, 8, 8, &mut src).unwrap();

    let descs = lcd.dma_chain().unwrap().descriptors();
    assert_eq!(descs.len(), 1);
    assert_ne!(descs[0].buffer(), data.as_ptr());
    assert_eq!(descs[0].len(), 128);
    assert_eq!(dma_writes(&sim.trace()), vec![(1024, false)]);
}

/// Converted pixels that fit one staging buffer go out in a single chain.
#[test]
fn converted_blit_is_staged_in_one_shot() {
    let (sim, mut lcd) = dma_rig();
    let data = [0xFF, 0x00, 0x00].repeat(64);
    let mut src = ImageSource::new(&data, 8, ColorDepth::Rgb888, ColorDepth::Rgb565);
    lcd.push_image(0, 0, 8, 8, &mut src).unwrap();

    assert_eq!(lcd.dma_chain().unwrap().descriptors().len(), 1);
    assert_eq!(chain_bytes(&lcd, 0), [0xF8, 0x00].repeat(64));
    assert_eq!(dma_writes(&sim.trace()), vec![(1024, false)]);
}

/// Larger converted images are staged and sent one row at a time.
#[test]
fn large_converted_blit_is_staged_per_row() {
    let (sim, mut lcd) = dma_rig();
    let mut data = [0xFF, 0x00, 0x00].repeat(40 * 19);
    data.extend([0x00, 0x00, 0xFF].repeat(40));
    let mut src = ImageSource::new(&data, 40, ColorDepth::Rgb888, ColorDepth::Rgb565);
    lcd.push_image(0, 0, 40, 20, &mut src).unwrap();

    assert_eq!(dma_writes(&sim.trace()), vec![(640, false); 20]);
    let descs = lcd.dma_chain().unwrap().descriptors();
    assert_eq!(descs.len(), 1);
    assert_eq!(descs[0].len(), 80);
    assert_eq!(chain_bytes(&lcd, 0), [0x00, 0x1F].repeat(40));
    assert_eq!(sim.frames()[1].data, addr(0, 19));
}

/// Opaque runs of a keyed image go out by DMA from staging.
#[test]
fn transparent_runs_use_dma_when_asked() {
    let (sim, mut lcd) = dma_rig();
    let mut data = vec![0u8; 2 * 20];
    data.extend([0x12, 0x34].repeat(40));
    let mut src =
        ImageSource::new(&data, 60, ColorDepth::Rgb565, ColorDepth::Rgb565).with_transparent(0);
    lcd.push_image_dma(0, 0, 60, 1, &mut src).unwrap();

    let frames = sim.frames();
    assert_eq!(frames[0].data, addr(20, 59));
    assert_eq!(dma_writes(&sim.trace()), vec![(640, false)]);
    assert_ne!(lcd.dma_chain().unwrap().descriptors()[0].buffer(), data.as_ptr());
    assert_eq!(chain_bytes(&lcd, 0), [0x12, 0x34].repeat(40));
}

/// Releasing the bus frees the staging buffers.
#[test]
fn release_bus_frees_staging() {
    let (_sim, mut lcd) = dma_rig();
    let data = numbered(8, 8);
    let mut src = ImageSource::new(&data, 8, ColorDepth::Rgb565, ColorDepth::Rgb565);
    lcd.push_image(0, 0, 8, 8, &mut src).unwrap();
    assert!(lcd.staging().capacity(lcd.staging().active()) >= 128);

    lcd.release_bus();
    assert_eq!(lcd.staging().capacity(0), 0);
    assert_eq!(lcd.staging().capacity(1), 0);
}

/// Small writes stay on the CPU path even with DMA available.
#[test]
fn small_writes_skip_dma() {
    let (sim, mut lcd) = dma_rig();
    lcd.write_pixels_dma(&[1, 2, 3, 4]).unwrap();
    assert!(dma_writes(&sim.trace()).is_empty());
    assert_eq!(sim.writes().last().map(|t| t.bytes.clone()), Some(vec![1, 2, 3, 4]));
}

#[test]
fn write_pixels_dma_uses_the_caller_buffer() {
    let (sim, mut lcd) = dma_rig();
    let data = vec![0x5Au8; 300];
    lcd.write_pixels_dma(&data).unwrap();
    assert_eq!(lcd.dma_chain().unwrap().descriptors()[0].buffer(), data.as_ptr());
    assert_eq!(dma_writes(&sim.trace()), vec![(2400, false)]);
    assert!(!lcd.dma_busy());
}

// ---------------------------------------------------------------------------
// Off-screen ring
// ---------------------------------------------------------------------------

#[test]
fn offscreen_ring_loops_until_stopped() {
    let (sim, mut lcd) = dma_rig();
    let rows: Vec<Vec<u8>> = (0..3).map(|r| vec![r; 8]).collect();
    let ptrs: Vec<*const u8> = rows.iter().map(|r| r.as_ptr()).collect();
    // SAFETY: `rows` outlives the transfer, which is stopped below.
    unsafe { lcd.setup_offscreen_dma(&ptrs, 4, 3, true) }.unwrap();

    let frames = sim.frames();
    assert_eq!(frames[0].data, addr(0, 3));
    assert_eq!(frames[1].data, addr(0, 2));
    assert_eq!(frames[2].opcode, 0x2C);

    let chain = lcd.dma_chain().unwrap();
    let descs = chain.descriptors();
    assert_eq!(descs.len(), 3);
    assert_eq!(descs[2].next(), chain.head());
    assert!(descs.iter().all(|d| !d.is_eof()));

    lcd.start_write().unwrap();
    assert!(lcd.draw_offscreen_dma().unwrap());
    assert_eq!(dma_writes(&sim.trace()), vec![(0, true)]);
    lcd.stop_offscreen_dma();
    lcd.end_write().unwrap();
    assert_ne!(sim.register(Reg::DmaConf) & SPI_DMA_TX_STOP, 0);
    drop(rows);
}

#[test]
fn offscreen_needs_a_channel_and_enough_rows() {
    let (_sim, mut lcd) = rig();
    let row = [0u8; 8];
    let ptrs = [row.as_ptr()];
    // SAFETY: the call fails before any descriptor is built.
    let err = unsafe { lcd.setup_offscreen_dma(&ptrs, 4, 1, false) };
    assert_eq!(err, Err(BusError::InvalidConfig(ConfigError::DmaChannel(0))));

    let (_sim, mut lcd) = dma_rig();
    // SAFETY: as above; two rows are requested but only one is given.
    let err = unsafe { lcd.setup_offscreen_dma(&ptrs, 4, 2, false) };
    assert_eq!(err, Err(BusError::BufferTooSmall { needed: 2, got: 1 }));
    assert!(!lcd.draw_offscreen_dma().unwrap());
}

/// Once stopped, or once another transfer reuses the chain, the off-screen
/// setup is gone and drawing does nothing.
#[test]
fn offscreen_setup_does_not_outlive_its_chain() {
    let (sim, mut lcd) = dma_rig();
    let rows: Vec<Vec<u8>> = (0..2).map(|r| vec![r; 8]).collect();
    let ptrs: Vec<*const u8> = rows.iter().map(|r| r.as_ptr()).collect();

    // SAFETY: the ring is stopped before `rows` is dropped.
    unsafe { lcd.setup_offscreen_dma(&ptrs, 4, 2, true) }.unwrap();
    lcd.start_write().unwrap();
    assert!(lcd.draw_offscreen_dma().unwrap());
    lcd.stop_offscreen_dma();
    assert!(!lcd.draw_offscreen_dma().unwrap());
    lcd.end_write().unwrap();

    // SAFETY: as above; this chain is never drawn.
    unsafe { lcd.setup_offscreen_dma(&ptrs, 4, 2, true) }.unwrap();
    let image = numbered(20, 20);
    let mut src = ImageSource::new(&image, 20, ColorDepth::Rgb565, ColorDepth::Rgb565);
    lcd.push_image_dma(0, 0, 20, 20, &mut src).unwrap();
    drop(image);
    drop(rows);

    sim.clear_trace();
    lcd.start_write().unwrap();
    assert!(!lcd.draw_offscreen_dma().unwrap());
    lcd.end_write().unwrap();
    assert!(dma_writes(&sim.trace()).is_empty());
}

/// The ring only starts inside an open session.
#[test]
fn offscreen_draw_needs_a_session() {
    let (sim, mut lcd) = dma_rig();
    let row = [0u8; 8];
    let ptrs = [row.as_ptr()];
    // SAFETY: the chain is never started.
    unsafe { lcd.setup_offscreen_dma(&ptrs, 4, 1, true) }.unwrap();
    sim.clear_trace();
    assert!(!lcd.draw_offscreen_dma().unwrap());
    assert!(dma_writes(&sim.trace()).is_empty());
}

/// Dropping the driver stops a running ring instead of waiting for it.
#[test]
fn drop_stops_a_running_ring() {
    let (sim, mut lcd) = dma_rig();
    let rows: Vec<Vec<u8>> = (0..2).map(|r| vec![r; 8]).collect();
    let ptrs: Vec<*const u8> = rows.iter().map(|r| r.as_ptr()).collect();
    // SAFETY: dropping the driver below stops the ring while `rows` lives.
    unsafe { lcd.setup_offscreen_dma(&ptrs, 4, 2, true) }.unwrap();
    lcd.start_write().unwrap();
    assert!(lcd.draw_offscreen_dma().unwrap());
    let resets = sim.dma_resets();

    sim.stall(true);
    drop(lcd);
    assert_ne!(sim.register(Reg::DmaConf) & SPI_DMA_TX_STOP, 0);
    assert_eq!(sim.dma_resets(), resets + 1);
    drop(rows);
}
