//! SPI clock divider calculation
//!
//! The controller derives SCLK from the APB clock through a prescaler
//! (1..=8192) and a counter (2..=64). [`freq_to_clock_div`] searches every
//! counter value for the prescaler that lands closest to the target and
//! encodes the winner in CLOCK register layout.

use panel_specs::ClockTargets;
use platform::registers::SPI_CLK_EQU_SYSCLK;

const PRE_MAX: u32 = 8192;
const N_MIN: u32 = 2;
const N_MAX: u32 = 64;

const PRE_SHIFT: u32 = 18;
const N_SHIFT: u32 = 12;
const H_SHIFT: u32 = 6;
const PRE_MASK: u32 = 0x1FFF;
const N_MASK: u32 = 0x3F;

/// CLOCK register fields for `(prescaler, counter)`.
#[allow(clippy::arithmetic_side_effects)] // Safety: pre in 1..=8192, n in 2..=64
const fn encode(pre: u32, n: u32) -> u32 {
    let pre = pre - 1;
    let n = n - 1;
    pre << PRE_SHIFT | n << N_SHIFT | ((n - 1) >> 1) << H_SHIFT | n
}

/// Divider for `hz` given an APB clock of `fapb`.
///
/// Above three quarters of `fapb` the divider is bypassed. A target of 0
/// yields the slowest divider.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // Safety: n >= 2, pre >= 1, hz > 0 on every division
pub fn freq_to_clock_div(fapb: u32, hz: u32) -> u32 {
    if hz == 0 {
        return encode(PRE_MAX, N_MAX);
    }
    if hz > (fapb >> 2) * 3 {
        return SPI_CLK_EQU_SYSCLK;
    }
    let half = hz >> 1;
    let mut best = (u32::MAX, 1, N_MIN);
    for n in N_MIN..=N_MAX {
        let pre = ((fapb / n).saturating_add(half) / hz).clamp(1, PRE_MAX);
        let err = (fapb / (pre * n)).abs_diff(hz);
        if err < best.0 {
            best = (err, pre, n);
            if err == 0 {
                break;
            }
        }
    }
    encode(best.1, best.2)
}

/// SCLK produced by `div` at an APB clock of `fapb`.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // Safety: both factors are at least 1
pub fn clock_div_to_freq(fapb: u32, div: u32) -> u32 {
    if div & SPI_CLK_EQU_SYSCLK != 0 {
        return fapb;
    }
    let pre = ((div >> PRE_SHIFT) & PRE_MASK) + 1;
    let n = ((div >> N_SHIFT) & N_MASK) + 1;
    fapb / (pre * n)
}

/// Write/read/fill dividers, recomputed only when the APB clock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockDividers {
    apb: u32,
    /// Commands and pixel writes
    pub write: u32,
    /// Read-back
    pub read: u32,
    /// Solid fills
    pub fill: u32,
}

impl ClockDividers {
    /// Forget the cached APB clock so the next refresh recomputes.
    pub fn invalidate(&mut self) {
        self.apb = 0;
    }

    /// Recompute for `apb` if it differs from the cached input.
    ///
    /// Returns `true` when the dividers changed.
    pub fn refresh(&mut self, apb: u32, targets: ClockTargets) -> bool {
        if apb == self.apb {
            return false;
        }
        self.apb = apb;
        self.write = freq_to_clock_div(apb, targets.write);
        self.read = freq_to_clock_div(apb, targets.read);
        self.fill = freq_to_clock_div(apb, targets.fill);
        true
    }

    /// APB clock the dividers were computed for; 0 when stale.
    #[must_use]
    pub fn apb(&self) -> u32 {
        self.apb
    }

    /// Fills run on a different divider than writes.
    #[must_use]
    pub fn fill_differs(&self) -> bool {
        self.fill != self.write
    }
}
