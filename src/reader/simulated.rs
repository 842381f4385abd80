//! In-process simulated reader, used in simulated mode.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::mpsc;

use super::{
    Device, DeviceError, DiscoveryConfig, DiscoveryUpdate, PaymentIntent, PaymentIntentStatus,
    Reader, ReaderConnectConfig,
};
use crate::api::TokenProvider;

/// error codes reported by the simulated device
pub mod codes {
    /// token provider failed while connecting
    pub const CONNECTION_TOKEN_PROVIDER_ERROR: &str = "CONNECTION_TOKEN_PROVIDER_ERROR";
    /// operation needs a connected reader
    pub const NOT_CONNECTED_TO_READER: &str = "NOT_CONNECTED_TO_READER";
    /// live discovery asked from the simulated device
    pub const UNSUPPORTED_OPERATION: &str = "UNSUPPORTED_OPERATION";
    /// client secret is not `{id}_secret_{..}`
    pub const INVALID_CLIENT_SECRET: &str = "INVALID_CLIENT_SECRET";
    /// payment intent in the wrong status for this step
    pub const UNEXPECTED_INTENT_STATUS: &str = "UNEXPECTED_INTENT_STATUS";
}

const SECRET_SEPARATOR: &str = "_secret_";

/// Simulated device with one reader.
///
/// A connection token is fetched before every connect, like a live SDK does,
/// so a broken backend still shows up as a connect failure.
pub struct SimulatedDevice {
    tokens: Arc<dyn TokenProvider>,
    connected: Mutex<Option<Reader>>,
}

impl Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl SimulatedDevice {
    /// Create device fetching connection tokens from `tokens`.
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            tokens,
            connected: Mutex::new(None),
        }
    }

    /// the one reader this device discovers
    pub fn reader() -> Reader {
        Reader {
            serial_number: "SIMULATOR".to_string(),
            device_type: "simulated_tap_to_pay".to_string(),
            location_id: None,
            simulated: true,
        }
    }

    /// Drop the connected reader.
    pub fn disconnect(&self) {
        if self
            .connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            log::info!("Simulated reader disconnected");
        }
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.connected_reader().is_none() {
            return Err(DeviceError::new(
                codes::NOT_CONNECTED_TO_READER,
                "no reader connected",
            ));
        }
        Ok(())
    }

    fn advance(
        intent: PaymentIntent,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    ) -> Result<PaymentIntent, DeviceError> {
        if intent.status != from {
            return Err(DeviceError::new(
                codes::UNEXPECTED_INTENT_STATUS,
                format!("payment intent is {:?}, expected {:?}", intent.status, from),
            ));
        }

        log::debug!("Simulated intent {:?} move to {:?}", intent.id, to);

        Ok(PaymentIntent {
            status: to,
            ..intent
        })
    }
}

#[async_trait::async_trait]
impl Device for SimulatedDevice {
    fn connected_reader(&self) -> Option<Reader> {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn discover(
        &self,
        config: DiscoveryConfig,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryUpdate>, DeviceError> {
        if !config.simulated {
            return Err(DeviceError::new(
                codes::UNSUPPORTED_OPERATION,
                "simulated device can't discover live readers",
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();

        // receiver is alive, sends can't fail
        let _ = tx.send(DiscoveryUpdate::Readers(vec![Self::reader()]));
        let _ = tx.send(DiscoveryUpdate::Done);

        Ok(rx)
    }

    async fn connect(
        &self,
        reader: Reader,
        config: ReaderConnectConfig,
    ) -> Result<Reader, DeviceError> {
        self.tokens.connection_token().await.map_err(|err| {
            DeviceError::new(codes::CONNECTION_TOKEN_PROVIDER_ERROR, err.to_string())
        })?;

        let reader = Reader {
            location_id: Some(config.location_id),
            ..reader
        };

        *self
            .connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reader.clone());

        log::info!("Simulated reader {} connected", reader.serial_number);

        Ok(reader)
    }

    async fn retrieve_payment_intent(
        &self,
        client_secret: &str,
    ) -> Result<PaymentIntent, DeviceError> {
        self.ensure_connected()?;

        let id = client_secret
            .split_once(SECRET_SEPARATOR)
            .map(|(id, _)| id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                DeviceError::new(codes::INVALID_CLIENT_SECRET, "malformed client secret")
            })?;

        Ok(PaymentIntent {
            id: Some(id.to_string()),
            amount: None,
            currency: None,
            status: PaymentIntentStatus::RequiresPaymentMethod,
        })
    }

    async fn collect_payment_method(
        &self,
        intent: PaymentIntent,
    ) -> Result<PaymentIntent, DeviceError> {
        self.ensure_connected()?;
        Self::advance(
            intent,
            PaymentIntentStatus::RequiresPaymentMethod,
            PaymentIntentStatus::RequiresConfirmation,
        )
    }

    async fn confirm_payment_intent(
        &self,
        intent: PaymentIntent,
    ) -> Result<PaymentIntent, DeviceError> {
        self.ensure_connected()?;
        Self::advance(
            intent,
            PaymentIntentStatus::RequiresConfirmation,
            PaymentIntentStatus::Succeeded,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api;

    fn device(ok: bool) -> SimulatedDevice {
        SimulatedDevice::new(Arc::new(move || async move {
            if ok {
                Ok("pst_test".to_string())
            } else {
                Err(api::Error::NoSecret)
            }
        }))
    }

    fn connect_config() -> ReaderConnectConfig {
        ReaderConnectConfig {
            location_id: "tml_1".to_string(),
            auto_reconnect_on_unexpected_disconnect: true,
        }
    }

    #[tokio::test]
    async fn test_token_failure_is_connect_failure() {
        let device = device(false);

        let err = device
            .connect(SimulatedDevice::reader(), connect_config())
            .await
            .unwrap_err();

        assert_eq!(err.code, codes::CONNECTION_TOKEN_PROVIDER_ERROR);
        assert!(device.connected_reader().is_none());
    }

    #[tokio::test]
    async fn test_payment_walks_through_statuses() {
        let device = device(true);

        let err = device.retrieve_payment_intent("pi_1_secret_x").await.unwrap_err();
        assert_eq!(err.code, codes::NOT_CONNECTED_TO_READER);

        let reader = device
            .connect(SimulatedDevice::reader(), connect_config())
            .await
            .unwrap();
        assert_eq!(reader.location_id.as_deref(), Some("tml_1"));

        let intent = device.retrieve_payment_intent("pi_1_secret_x").await.unwrap();
        assert_eq!(intent.id.as_deref(), Some("pi_1"));

        // confirm before collect is refused
        let err = device
            .confirm_payment_intent(intent.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNEXPECTED_INTENT_STATUS);

        let collected = device.collect_payment_method(intent).await.unwrap();
        let confirmed = device.confirm_payment_intent(collected).await.unwrap();
        assert_eq!(confirmed.status, PaymentIntentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_malformed_secret_and_live_discovery() {
        let device = device(true);
        device
            .connect(SimulatedDevice::reader(), connect_config())
            .await
            .unwrap();

        let err = device.retrieve_payment_intent("cs_1").await.unwrap_err();
        assert_eq!(err.code, codes::INVALID_CLIENT_SECRET);

        let err = device
            .discover(DiscoveryConfig {
                simulated: false,
                location_id: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::UNSUPPORTED_OPERATION);
    }
}
