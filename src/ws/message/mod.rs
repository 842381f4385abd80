//! Payment event messages carried by the feed.

mod fallback;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Payment event record decoded from a feed frame, every field may be absent.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentEvent {
    /// payment intent id
    pub payment_intent_id: Option<String>,
    /// payment intent client secret
    pub client_secret: Option<String>,
    /// currency code
    pub currency: Option<String>,
    /// amount in minor unit
    pub amount: Option<i64>,
    /// tenant id the event belongs to
    pub tpos_id: Option<String>,
    /// lightning payment hash bound to this payment
    pub payment_hash: Option<String>,
}

/// Event can not be acted on
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum NotActionable {
    /// client secret missing or blank
    #[snafu(display("missing client_secret in payload"))]
    MissingClientSecret,

    /// payment intent id missing or blank
    #[snafu(display("missing payment_intent_id in payload"))]
    MissingPaymentIntentId,
}

/// An actionable payment event, client secret and payment intent id are non-blank.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    /// payment intent id
    pub payment_intent_id: String,
    /// payment intent client secret
    pub client_secret: String,
    /// currency code
    pub currency: Option<String>,
    /// amount in minor unit
    pub amount: Option<i64>,
    /// tenant id the event belongs to
    pub tpos_id: Option<String>,
    /// lightning payment hash bound to this payment
    pub payment_hash: Option<String>,
}

impl Debug for PaymentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentRequest")
            .field("payment_intent_id", &self.payment_intent_id)
            .field("client_secret", &"<redacted>")
            .field("currency", &self.currency)
            .field("amount", &self.amount)
            .field("tpos_id", &self.tpos_id)
            .field("payment_hash", &self.payment_hash)
            .finish()
    }
}

fn non_blank(val: Option<String>) -> Option<String> {
    val.filter(|s| !s.trim().is_empty())
}

impl PaymentEvent {
    /// Decode a text frame, never fails.
    ///
    /// Json is tried first, the loose `key=value` format second. The result can
    /// be all `None`, check it with [`PaymentEvent::is_actionable`].
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(err) => {
                log::debug!("Payload is not a json payment event ({}), parse as loose format", err);
                fallback::parse(raw)
            }
        }
    }

    /// Client secret and payment intent id are both non-blank.
    pub fn is_actionable(&self) -> bool {
        let present = |val: &Option<String>| matches!(val.as_deref(), Some(s) if !s.trim().is_empty());
        present(&self.client_secret) && present(&self.payment_intent_id)
    }

    /// Check actionability and convert.
    pub fn into_request(self) -> Result<PaymentRequest, NotActionable> {
        let client_secret = non_blank(self.client_secret).context(error::MissingClientSecret)?;
        let payment_intent_id =
            non_blank(self.payment_intent_id).context(error::MissingPaymentIntentId)?;

        Ok(PaymentRequest {
            payment_intent_id,
            client_secret,
            currency: self.currency,
            amount: self.amount,
            tpos_id: self.tpos_id,
            payment_hash: self.payment_hash,
        })
    }
}
