//! Payment dispatch: admitted feed events drive a retrieve, collect, confirm
//! sequence on a ready reader.

mod gate;

pub use gate::AdmissionGate;

use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use snafu::prelude::*;
use tokio::sync::mpsc;

use crate::{
    config::{ConfigStore, ConnectionConfig},
    reader::{self, Device, DeviceError, ReadyError, ReaderSession, SessionOptions},
    ws::{EventStream, PaymentRequest},
};

/// settled id reported when the confirmed intent carries none
pub const UNKNOWN_INTENT_ID: &str = "unknown_intent_id";

/// Dispatch error, terminal for the event, never retried
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum DispatchError {
    /// config snapshot misses an identity field
    #[snafu(display("terminal is not configured"))]
    ConfigIncomplete,

    /// no reader ready
    #[snafu(display("{source}"))]
    DeviceNotReady {
        /// source error
        source: ReadyError,
    },

    /// retrieve step failed
    #[snafu(display("retrieve failed: {source}"))]
    RetrieveFailed {
        /// source error
        source: DeviceError,
    },

    /// collect step failed
    #[snafu(display("collect failed: {source}"))]
    CollectFailed {
        /// source error
        source: DeviceError,
    },

    /// confirm step failed
    #[snafu(display("confirm failed: {source}"))]
    ConfirmFailed {
        /// source error
        source: DeviceError,
    },
}

impl DispatchError {
    /// Short machine readable tag of the failure.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ConfigIncomplete => "config-incomplete",
            Self::DeviceNotReady { .. } => "device-not-ready",
            Self::RetrieveFailed { .. } => "retrieve-failed",
            Self::CollectFailed { .. } => "collect-failed",
            Self::ConfirmFailed { .. } => "confirm-failed",
        }
    }
}

/// Dispatcher tunables.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// how long an admission keeps the gate busy
    pub cooldown: Duration,
    /// bound of the reader session run before each payment
    pub ready_timeout: Duration,
    /// reader session tunables
    pub session: SessionOptions,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(10),
            session: SessionOptions::default(),
        }
    }
}

/// Terminal outcome of one admitted payment event.
#[derive(Debug)]
pub struct Outcome {
    /// id from the feed event
    pub payment_intent_id: String,
    /// settled id, or why it failed
    pub result: Result<String, DispatchError>,
}

/// Payment event dispatcher, cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    device: Arc<dyn Device>,
    store: Arc<dyn ConfigStore>,
    gate: Arc<AdmissionGate>,
    options: DispatchOptions,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl Dispatcher {
    /// Create dispatcher and the receiver of its outcomes.
    pub fn new(
        device: Arc<dyn Device>,
        store: Arc<dyn ConfigStore>,
        options: DispatchOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Outcome>) {
        let (outcomes, outcomes_rx) = mpsc::unbounded_channel();

        let dispatcher = Self {
            device,
            store,
            gate: Arc::new(AdmissionGate::new(options.cooldown)),
            options,
            outcomes,
        };

        (dispatcher, outcomes_rx)
    }

    /// the admission gate in front of this dispatcher
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Admit `request` and collect it in background.
    ///
    /// Returns false when the gate dropped it. The outcome of an admitted
    /// request is sent to the outcome receiver.
    pub fn dispatch(&self, request: PaymentRequest) -> bool {
        if !self.gate.try_admit(&request) {
            return false;
        }

        let dispatcher = self.clone();

        tokio::spawn(async move {
            let result = dispatcher.collect(&request).await;

            let outcome = Outcome {
                payment_intent_id: request.payment_intent_id,
                result,
            };

            if dispatcher.outcomes.send(outcome).is_err() {
                log::debug!("Outcome receiver dropped");
            }
        });

        true
    }

    /// Get a ready reader, then run retrieve, collect and confirm once.
    ///
    /// Bypasses the admission gate.
    pub async fn collect(&self, request: &PaymentRequest) -> Result<String, DispatchError> {
        let config = ConnectionConfig::snapshot(&*self.store);
        ensure!(config.is_complete(), error::ConfigIncomplete);

        log::info!(
            "Collecting payment {} ({:?} {:?})",
            request.payment_intent_id,
            request.amount,
            request.currency
        );

        let mut session = ReaderSession::new(self.device.clone(), &config, self.options.session);
        reader::ensure_ready_within(&mut session, self.options.ready_timeout)
            .await
            .context(error::DeviceNotReady)?;

        let intent = self
            .device
            .retrieve_payment_intent(&request.client_secret)
            .await
            .context(error::RetrieveFailed)?;

        log::debug!("Retrieved payment intent {:?}", intent.id);

        let collected = self
            .device
            .collect_payment_method(intent)
            .await
            .context(error::CollectFailed)?;

        log::debug!("Collected payment method for {:?}", collected.id);

        let confirmed = self
            .device
            .confirm_payment_intent(collected)
            .await
            .context(error::ConfirmFailed)?;

        Ok(confirmed.id.unwrap_or_else(|| UNKNOWN_INTENT_ID.to_string()))
    }

    /// Dispatch every event of `events` until the stream ends.
    pub async fn run(self, mut events: EventStream) {
        log::debug!("Dispatcher start");

        while let Some(request) = events.next().await {
            self.dispatch(request);
        }

        log::debug!("Event stream ended, dispatcher stop");
    }
}
