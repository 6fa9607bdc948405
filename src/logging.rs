//! Logging abstraction layer
//!
//! Navigation, matching and loader internals log through these macros so the
//! crate works with either the `log` or the `tracing` ecosystem.
//!
//! # Features
//!
//! - `log` (default) - Uses the standard `log` crate
//! - `tracing` - Uses the `tracing` crate for structured logging
//!
//! Choose one feature at compile time. They are mutually exclusive.
//!
//! # Levels
//!
//! | Macro | Used for |
//! |---|---|
//! | [`trace_log!`] | route matching, loader steps, same-URL no-ops |
//! | [`debug_log!`] | navigation start, commit, supersession, redirects |
//! | [`info_log!`] | router construction |
//! | [`warn_log!`] | listener failures |
//! | [`error_log!`] | server-side navigation failures, failing `error` listeners |
//!
//! ```ignore
//! use route_pilot::{debug_log, trace_log};
//!
//! trace_log!("scanning {} routes", routes.len());
//! debug_log!("navigation #{} committed: {}", seq, href);
//! ```

/// Forward to the enabled backend at `$level`
#[doc(hidden)]
#[macro_export]
macro_rules! __route_log {
    ($level:ident, $($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::$level!($($arg)*);
        #[cfg(feature = "log")]
        ::log::$level!($($arg)*);
    };
}

/// Per-route matching and per-model loader steps
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        $crate::__route_log!(trace, $($arg)*)
    };
}

/// Navigation pipeline transitions
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::__route_log!(debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        $crate::__route_log!(info, $($arg)*)
    };
}

/// Listener failures
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::__route_log!(warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        $crate::__route_log!(error, $($arg)*)
    };
}
