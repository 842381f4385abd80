use std::sync::Arc;

use snafu::prelude::*;
use tokio::sync::{mpsc, watch};

use crate::{
    api,
    config::{has_saved_config, ConfigStore, ConnectionConfig, PairingPayload},
    dispatch::{DispatchOptions, Dispatcher, Outcome},
    error,
    reader::{self, Device, Reader, ReaderSession, SimulatedDevice},
    ws::{self, ConnectionState},
    Result,
};

/// Terminal tunables.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalOptions {
    /// event feed client
    pub client: ws::ClientOptions,
    /// dispatcher, includes the reader session
    pub dispatch: DispatchOptions,
}

/// Tap to pay terminal instance
#[derive(Debug)]
pub struct Terminal {
    store: Arc<dyn ConfigStore>,
    device: Arc<dyn Device>,
    options: TerminalOptions,
}

/// A started terminal: the live feed plus the dispatch outcomes.
///
/// Dropping it stops the feed.
#[derive(Debug)]
pub struct RunningTerminal {
    client: ws::Client,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
}

impl RunningTerminal {
    /// next payment outcome, `None` once dispatching stopped
    pub async fn next_outcome(&mut self) -> Option<Outcome> {
        self.outcomes.recv().await
    }

    /// current feed state
    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// watch feed state changes
    pub fn state_watcher(&self) -> watch::Receiver<ConnectionState> {
        self.client.state_watcher()
    }

    /// Stop the feed, in flight payments still report their outcome.
    pub fn stop(&self) {
        self.client.stop()
    }
}

impl Terminal {
    /// Create terminal over a config store and a device capability.
    pub fn new(store: Arc<dyn ConfigStore>, device: Arc<dyn Device>, options: TerminalOptions) -> Self {
        Self {
            store,
            device,
            options,
        }
    }

    /// Create terminal with a simulated device.
    ///
    /// Connection tokens are fetched from the backend configured in `store` at
    /// connect time, so pairing later is fine. The scheme follows
    /// `options.client.secure`, same as the feed.
    pub fn simulated(store: Arc<dyn ConfigStore>, options: TerminalOptions) -> Self {
        let token_store = store.clone();
        let secure = options.client.secure;

        let tokens = move || {
            let store = token_store.clone();
            async move {
                let config = ConnectionConfig::snapshot(&*store);
                api::Client::from_config(&config, secure)?
                    .connection_token()
                    .await
            }
        };

        let device = SimulatedDevice::new(Arc::new(tokens));

        Self::new(store, Arc::new(device), options)
    }

    /// the config store
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Whether pairing config exists and every identity field is set.
    pub fn is_paired(&self) -> bool {
        has_saved_config(&*self.store) && ConnectionConfig::snapshot(&*self.store).is_complete()
    }

    /// Parse a pairing url and persist it.
    pub fn pair(&self, url: &str) -> Result<PairingPayload> {
        let payload: PairingPayload = url.parse().context(error::InvalidPairing)?;

        payload
            .save_to(&*self.store)
            .context(error::SaveConfig)?;

        log::info!(
            "Paired with {} tenant {} at location {}",
            payload.origin,
            payload.tenant_id,
            payload.location_id
        );

        Ok(payload)
    }

    /// Connect a reader for this terminal.
    ///
    /// `on_progress` gets the candidate count of every discovery update.
    pub async fn register<F>(&self, on_progress: F) -> Result<Reader>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        ensure!(self.is_paired(), error::NotPaired);

        let config = ConnectionConfig::snapshot(&*self.store);

        log::info!(
            "Registering {} reader at location {}",
            if config.simulated { "simulated" } else { "live" },
            config.location_id
        );

        let mut session =
            ReaderSession::new(self.device.clone(), &config, self.options.dispatch.session)
                .on_progress(on_progress);

        reader::ensure_ready_within(&mut session, self.options.dispatch.ready_timeout)
            .await
            .context(error::RegistrationFailed)
    }

    /// Start the feed and dispatch its events.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<RunningTerminal> {
        ensure!(self.is_paired(), error::NotPaired);

        let config = ConnectionConfig::snapshot(&*self.store);
        if config.kiosk_mode {
            log::info!("Kiosk mode on");
        }

        let (client, events) = ws::Client::new(self.store.clone(), self.options.client);
        let (dispatcher, outcomes) =
            Dispatcher::new(self.device.clone(), self.store.clone(), self.options.dispatch);

        tokio::spawn(dispatcher.run(events));
        client.start();

        log::info!("Terminal started, tenant {}", config.tenant_id);

        Ok(RunningTerminal { client, outcomes })
    }

    /// Start and log every payment outcome, forever.
    pub async fn run(&self) -> Result<()> {
        let mut running = self.start()?;

        while let Some(outcome) = running.next_outcome().await {
            match outcome.result {
                Ok(settled) => log::info!("Payment {} settled as {}", outcome.payment_intent_id, settled),
                Err(err) => log::error!(
                    "Payment {} failed ({}): {}",
                    outcome.payment_intent_id,
                    err.tag(),
                    err
                ),
            }
        }

        log::info!("Terminal stopped");

        Ok(())
    }
}
