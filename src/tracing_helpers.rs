//! Zero-cost tracing helper.
//!
//! When the `tracing` feature is enabled, [`tree_log!`] forwards to the
//! `tracing` macro for the requested level. When disabled (default), it
//! compiles to a no-op with zero runtime overhead.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::tracing_helpers::tree_log;
//!
//! tree_log!(trace, "split at byte {split_at}");
//! tree_log!(warn, "node allocation exhausted");
//! ```
//!
//! ```bash
//! # Normal build - no tracing overhead
//! cargo build --release
//!
//! # Run tests with tracing enabled
//! RUST_LOG=famradix=trace cargo test --features tracing
//! ```

/// Emit a tracing event at the given level (`trace`, `debug`, `warn`, ...).
/// Compiles to a no-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! tree_log {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! tree_log {
    ($level:ident, $($arg:tt)*) => {
        // Completely empty - zero cost
    };
}

pub(crate) use tree_log;
