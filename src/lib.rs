//! # taptpos
//!
//! Control plane of a tap to pay point of sale terminal.
//!
//! - [`ws`]: resilient event feed from the backend, with backoff reconnect
//!   and tolerant payment event decoding.
//! - [`reader`]: card reader discovery and connect, with a watchdog.
//! - [`dispatch`]: single-flight admission and the payment collection sequence.
//! - [`Terminal`]: pairing, reader registration and the run loop over all of them.

#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod dispatch;
pub mod reader;
pub mod ws;

mod error;
mod terminal;

pub use error::{Error, Result};
pub use terminal::{RunningTerminal, Terminal, TerminalOptions};
