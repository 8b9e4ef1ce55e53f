//! GPIO pin configuration
//!
//! Panel control lines (data/command, chip-select) and the bus pins are
//! addressed by GPIO number. The host decides how a requested [`PinMode`] maps
//! onto what its pads support.

/// Logic level of an output pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinState {
    /// Logic low
    Low,
    /// Logic high
    High,
}

impl From<bool> for PinState {
    fn from(value: bool) -> Self {
        if value {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl From<PinState> for bool {
    fn from(state: PinState) -> Self {
        matches!(state, PinState::High)
    }
}

/// Requested pin direction / pull configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// Push-pull output
    Output,
    /// Floating input
    Input,
    /// Input with internal pull-up
    InputPullUp,
    /// Input with internal pull-down
    InputPullDown,
}

impl PinMode {
    /// Map the requested mode onto what the pad supports.
    ///
    /// Pull variants the hardware lacks degrade to a plain [`PinMode::Input`].
    #[must_use]
    pub const fn resolve(self, supports_pullup: bool, supports_pulldown: bool) -> Self {
        match self {
            Self::InputPullUp if !supports_pullup => Self::Input,
            Self::InputPullDown if !supports_pulldown => Self::Input,
            other => other,
        }
    }

    /// `true` for any input variant.
    #[must_use]
    pub const fn is_input(self) -> bool {
        !matches!(self, Self::Output)
    }
}
