//! Diagnostic macros that forward to `tracing` when the `tracing` feature is enabled,
//! and compile to nothing otherwise.

#[cfg(feature = "tracing")]
macro_rules! debug_event {
    ($($arg:tt)+) => { ::tracing::debug!($($arg)+) };
}

#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($($arg:tt)+) => { ::tracing::trace!($($arg)+) };
}

#[cfg(feature = "tracing")]
macro_rules! warn_event {
    ($($arg:tt)+) => { ::tracing::warn!($($arg)+) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_event {
    ($($arg:tt)+) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($($arg:tt)+) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_event {
    ($($arg:tt)+) => {};
}

pub(crate) use {debug_event, trace_event, warn_event};
