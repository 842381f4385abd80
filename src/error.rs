//! crate error types

use snafu::prelude::*;

use crate::{
    config::{ConfigError, ParsePairingError},
    reader::ReadyError,
};

/// crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Origin, tenant id, bearer or location id not configured
    #[snafu(display("terminal is not paired, scan a pairing url first"))]
    NotPaired,

    /// Pairing url can't be parsed
    #[snafu(display("invalid pairing url: {source}"))]
    InvalidPairing {
        /// source error
        source: ParsePairingError,
    },

    /// Persist config failed
    #[snafu(display("save config failed: {source}"))]
    SaveConfig {
        /// source error
        source: ConfigError,
    },

    /// Reader registration failed
    #[snafu(display("reader registration failed: {source}"))]
    RegistrationFailed {
        /// source error
        source: ReadyError,
    },
}
