//! Development-time diagnostics.
//!
//! The engine reports through `tracing`: superseded commits and enqueued updates
//! at `debug`, record churn at `trace`, unobserved component failures at `error`.
//! [`logging`] installs a console subscriber for them.

pub mod logging;

pub use logging::{install_panic_logger, install_tracing, set_log_level};
