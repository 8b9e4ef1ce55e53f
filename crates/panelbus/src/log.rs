//! Logging front-end
//!
//! Forwards to `defmt` on embedded builds and `tracing` on host builds; both
//! may be enabled at once. With neither feature the arguments are still
//! type-checked but nothing is emitted. Only `{}` placeholders are portable
//! across both backends.

macro_rules! emit {
    ($level:ident, $($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::$level!($($arg)*);
        #[cfg(feature = "tracing")]
        tracing::$level!($($arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

macro_rules! trace {
    ($($arg:tt)*) => { emit!(trace, $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { emit!(debug, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => { emit!(info, $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { emit!(warn, $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { emit!(error, $($arg)*) };
}
