//! Card reader capability layer and reader session.
//!
//! The payment SDK driving the physical (or simulated) reader is an external
//! collaborator, modeled by the [`Device`] trait. [`ReaderSession`] runs the
//! discovery, connect and watchdog dance on top of it.

mod session;
pub mod simulated;

pub use session::{ReaderSession, SessionError, SessionOptions, SessionState};
pub use simulated::SimulatedDevice;

use std::{fmt::Display, time::Duration};

use enum_as_inner::EnumAsInner;
use snafu::prelude::*;
use tokio::sync::mpsc;

/// Error reported by the device capability layer, an error code plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    /// SDK error code, like `CONNECTION_TOKEN_PROVIDER_ERROR`
    pub code: String,
    /// human readable message
    pub message: String,
}

impl DeviceError {
    /// Create error with code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.code, self.message)
    }
}

impl std::error::Error for DeviceError {}

/// A card reader known to the device layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reader {
    /// reader serial number
    pub serial_number: String,
    /// reader model, like `tap_to_pay_device` or `simulated`
    pub device_type: String,
    /// location the reader is registered to, set after connect
    pub location_id: Option<String>,
    /// whether this is a simulated reader
    pub simulated: bool,
}

/// Discovery scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// discover simulated readers instead of live ones
    pub simulated: bool,
    /// configured location id, empty when unset
    pub location_id: String,
}

/// Reader connect parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConnectConfig {
    /// location to register the reader to
    pub location_id: String,
    /// let the device layer reconnect by itself after an unexpected disconnect
    pub auto_reconnect_on_unexpected_disconnect: bool,
}

/// One discovery callback.
#[derive(Debug, Clone, EnumAsInner)]
pub enum DiscoveryUpdate {
    /// current candidate list, may be empty
    Readers(Vec<Reader>),
    /// discovery failed, terminal
    Failed(DeviceError),
    /// discovery finished without error
    Done,
}

/// Lifecycle of a payment intent on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentIntentStatus {
    /// waiting for a card
    RequiresPaymentMethod,
    /// card collected, waiting for confirm
    RequiresConfirmation,
    /// confirm in progress
    Processing,
    /// settled
    Succeeded,
    /// canceled
    Canceled,
}

/// Payment intent as seen by the device layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// intent id, the device may not know it
    pub id: Option<String>,
    /// amount in minor unit
    pub amount: Option<i64>,
    /// currency code
    pub currency: Option<String>,
    /// current status
    pub status: PaymentIntentStatus,
}

/// Payment capability of a card reader SDK.
///
/// Every async method resolves exactly once, so callers never need to guard
/// against a second terminal callback of one operation.
#[async_trait::async_trait]
pub trait Device: std::fmt::Debug + Send + Sync {
    /// reader currently connected, if any
    fn connected_reader(&self) -> Option<Reader>;

    /// Start discovery, updates arrive on the returned channel.
    ///
    /// An `Err` here means discovery could not even start.
    async fn discover(
        &self,
        config: DiscoveryConfig,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryUpdate>, DeviceError>;

    /// connect to a discovered reader
    async fn connect(
        &self,
        reader: Reader,
        config: ReaderConnectConfig,
    ) -> Result<Reader, DeviceError>;

    /// fetch the payment intent behind a client secret
    async fn retrieve_payment_intent(&self, client_secret: &str)
        -> Result<PaymentIntent, DeviceError>;

    /// wait for a card tap on the connected reader
    async fn collect_payment_method(&self, intent: PaymentIntent)
        -> Result<PaymentIntent, DeviceError>;

    /// confirm a collected payment intent
    async fn confirm_payment_intent(&self, intent: PaymentIntent)
        -> Result<PaymentIntent, DeviceError>;
}

/// Error when a reader can't be made ready in time
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ReadyError {
    /// the session resolved with an error
    #[snafu(display("{source}"))]
    Session {
        /// source error
        source: SessionError,
    },

    /// session did not resolve in time
    #[snafu(display("unsupported or unreachable device, no reader ready after {waited:?}"))]
    Unreachable {
        /// time limit
        waited: Duration,
    },
}

/// Run a session bounded by `limit`.
///
/// The session itself has no notion of being stuck, a session still waiting
/// when `limit` elapses is reported as [`ReadyError::Unreachable`].
pub async fn ensure_ready_within(
    session: &mut ReaderSession,
    limit: Duration,
) -> Result<Reader, ReadyError> {
    match tokio::time::timeout(limit, session.ensure_ready()).await {
        Ok(result) => result.context(error::Session),
        Err(_) => {
            log::warn!("No reader ready after {:?}", limit);
            error::Unreachable { waited: limit }.fail()
        }
    }
}
