use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use enum_as_inner::EnumAsInner;
use futures_util::future::BoxFuture;
use snafu::prelude::*;
use tokio::time::Instant;

use super::{Device, DeviceError, DiscoveryConfig, DiscoveryUpdate, Reader, ReaderConnectConfig};
use crate::config::ConnectionConfig;

/// Reader session error
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum SessionError {
    /// device refused to start discovery
    #[snafu(display("start discovery failed: {source}"))]
    DiscoveryStart {
        /// source error
        source: DeviceError,
    },

    /// discovery reported a terminal failure
    #[snafu(display("discovery failed: {source}"))]
    DiscoveryFailed {
        /// source error
        source: DeviceError,
    },

    /// connect failed and no reader is connected
    #[snafu(display("connect failed: {source}"))]
    ConnectFailed {
        /// source error
        source: DeviceError,
    },
}

/// Progress of one session.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum SessionState {
    /// ensure_ready not called yet
    NotStarted,
    /// discovery running, nothing connected yet
    Discovering,
    /// connect issued to the first candidate
    ConnectAttempted,
    /// resolved ready
    Connected,
    /// resolved with error, the reason
    Failed(String),
}

/// Session tunables.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// how often the watchdog polls for a connected reader
    pub watchdog_interval: Duration,
    /// how long the watchdog keeps polling after connect is issued
    pub watchdog_ceiling: Duration,
    /// passed to the device on connect
    pub auto_reconnect: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_millis(500),
            watchdog_ceiling: Duration::from_secs(12),
            auto_reconnect: true,
        }
    }
}

type ProgressFn = Box<dyn Fn(usize) + Send + Sync>;

/// One discovery -> connect -> ready attempt.
///
/// A session is disposable, create one per registration or per payment. It
/// resolves at most once: after the first resolution every later call of
/// [`ReaderSession::ensure_ready`] returns the same result without touching the
/// device.
pub struct ReaderSession {
    device: Arc<dyn Device>,
    discovery: DiscoveryConfig,
    connect: ReaderConnectConfig,
    options: SessionOptions,
    on_progress: Option<ProgressFn>,
    state: SessionState,
    resolution: Option<Result<Reader, SessionError>>,
}

impl Debug for ReaderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSession")
            .field("device", &self.device)
            .field("discovery", &self.discovery)
            .field("connect", &self.connect)
            .field("options", &self.options)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

struct Watchdog {
    next_poll: Instant,
    deadline: Instant,
}

/// Await the future in `slot` if there is one, never resolve otherwise.
async fn resolve<F: Future + Unpin>(slot: Option<&mut F>) -> F::Output {
    match slot {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

impl ReaderSession {
    /// Create a session scoped by a config snapshot.
    pub fn new(device: Arc<dyn Device>, config: &ConnectionConfig, options: SessionOptions) -> Self {
        Self {
            device,
            discovery: DiscoveryConfig {
                simulated: config.simulated,
                location_id: config.location_id.clone(),
            },
            connect: ReaderConnectConfig {
                location_id: config.location_id.clone(),
                auto_reconnect_on_unexpected_disconnect: options.auto_reconnect,
            },
            options,
            on_progress: None,
            state: SessionState::NotStarted,
            resolution: None,
        }
    }

    /// Report candidate count of every discovery update.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn move_to(&mut self, state: SessionState) {
        log::debug!("Reader session move to {:?} state", state);
        self.state = state;
    }

    fn settle(&mut self, result: Result<Reader, SessionError>) -> Result<Reader, SessionError> {
        match &result {
            Ok(reader) => {
                log::info!(
                    "Reader {} ({}) ready",
                    reader.serial_number,
                    reader.device_type
                );
                self.move_to(SessionState::Connected);
            }
            Err(err) => {
                log::error!("Reader session failed: {}", err);
                self.move_to(SessionState::Failed(err.to_string()));
            }
        }

        self.resolution = Some(result.clone());
        result
    }

    /// Make sure a reader is connected.
    ///
    /// Resolves immediately when the device already has a connected reader.
    /// Otherwise discovers, connects the first candidate once and polls for a
    /// connected reader in the meantime, since the device may finish the
    /// connect by itself while the connect call still reports a failure.
    ///
    /// This may wait forever, e.g. discovery finds nothing. Bound it with
    /// [`super::ensure_ready_within`].
    pub async fn ensure_ready(&mut self) -> Result<Reader, SessionError> {
        if let Some(resolution) = &self.resolution {
            log::debug!("Reader session already resolved");
            return resolution.clone();
        }

        if let Some(reader) = self.device.connected_reader() {
            log::debug!("Reader already connected, skip discovery");
            return self.settle(Ok(reader));
        }

        self.move_to(SessionState::Discovering);

        let discovered = self.device.discover(self.discovery.clone()).await;
        let mut updates = match discovered.context(error::DiscoveryStart) {
            Ok(updates) => updates,
            Err(err) => return self.settle(Err(err)),
        };

        let mut discovering = true;
        let mut connect: Option<BoxFuture<'static, Result<Reader, DeviceError>>> = None;
        let mut watchdog: Option<Watchdog> = None;

        loop {
            let next_poll = watchdog.as_ref().map(|w| w.next_poll);

            tokio::select! {
                biased;

                update = updates.recv(), if discovering => match update {
                    Some(DiscoveryUpdate::Readers(readers)) => {
                        log::info!("Discovered readers: {}", readers.len());

                        if let Some(f) = &self.on_progress {
                            f(readers.len());
                        }

                        if let Some(reader) = self.device.connected_reader() {
                            return self.settle(Ok(reader));
                        }

                        if self.state.is_connect_attempted() {
                            continue;
                        }

                        let first = match readers.into_iter().next() {
                            Some(reader) => reader,
                            None => continue,
                        };

                        log::debug!("Connecting reader {}", first.serial_number);

                        let now = Instant::now();
                        watchdog = Some(Watchdog {
                            next_poll: now + self.options.watchdog_interval,
                            deadline: now + self.options.watchdog_ceiling,
                        });

                        let device = self.device.clone();
                        let config = self.connect.clone();
                        connect = Some(Box::pin(async move { device.connect(first, config).await }));

                        self.move_to(SessionState::ConnectAttempted);
                    }
                    Some(DiscoveryUpdate::Failed(err)) => {
                        return self.settle(Err(err).context(error::DiscoveryFailed));
                    }
                    Some(DiscoveryUpdate::Done) | None => {
                        log::debug!("Discovery finished");
                        discovering = false;
                    }
                },

                result = resolve(connect.as_mut()), if connect.is_some() => {
                    connect = None;

                    match result {
                        Ok(reader) => return self.settle(Ok(reader)),
                        Err(err) => {
                            log::warn!("Connect failed {}", err);

                            if let Some(reader) = self.device.connected_reader() {
                                log::info!("Reader connected despite connect failure");
                                return self.settle(Ok(reader));
                            }

                            return self.settle(Err(err).context(error::ConnectFailed));
                        }
                    }
                },

                _ = tokio::time::sleep_until(next_poll.unwrap_or_else(Instant::now)), if next_poll.is_some() => {
                    if let Some(reader) = self.device.connected_reader() {
                        log::info!("Watchdog found connected reader");
                        return self.settle(Ok(reader));
                    }

                    watchdog = watchdog.and_then(|w| {
                        let next_poll = w.next_poll + self.options.watchdog_interval;
                        if next_poll > w.deadline {
                            log::debug!("Reader watchdog gave up");
                            None
                        } else {
                            Some(Watchdog { next_poll, ..w })
                        }
                    });
                },

                else => {
                    log::debug!("Reader session has nothing left to wait for");
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;
    use crate::reader::PaymentIntent;

    #[derive(Debug, Default)]
    struct Scripted {
        connected: Mutex<Option<Reader>>,
        discover_calls: Mutex<usize>,
        updates: Mutex<Vec<DiscoveryUpdate>>,
    }

    fn reader(serial: &str) -> Reader {
        Reader {
            serial_number: serial.to_string(),
            device_type: "test".to_string(),
            location_id: None,
            simulated: true,
        }
    }

    #[async_trait::async_trait]
    impl Device for Scripted {
        fn connected_reader(&self) -> Option<Reader> {
            self.connected.lock().unwrap().clone()
        }

        async fn discover(
            &self,
            _config: DiscoveryConfig,
        ) -> Result<mpsc::UnboundedReceiver<DiscoveryUpdate>, DeviceError> {
            *self.discover_calls.lock().unwrap() += 1;
            let (tx, rx) = mpsc::unbounded_channel();
            for update in self.updates.lock().unwrap().drain(..) {
                tx.send(update).unwrap();
            }
            Ok(rx)
        }

        async fn connect(
            &self,
            reader: Reader,
            _config: ReaderConnectConfig,
        ) -> Result<Reader, DeviceError> {
            *self.connected.lock().unwrap() = Some(reader.clone());
            Ok(reader)
        }

        async fn retrieve_payment_intent(&self, _: &str) -> Result<PaymentIntent, DeviceError> {
            unimplemented!()
        }

        async fn collect_payment_method(
            &self,
            _: PaymentIntent,
        ) -> Result<PaymentIntent, DeviceError> {
            unimplemented!()
        }

        async fn confirm_payment_intent(
            &self,
            _: PaymentIntent,
        ) -> Result<PaymentIntent, DeviceError> {
            unimplemented!()
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            origin: "h".to_string(),
            tenant_id: "t".to_string(),
            bearer: "b".to_string(),
            location_id: "loc".to_string(),
            simulated: true,
            kiosk_mode: false,
        }
    }

    #[tokio::test]
    async fn test_resolution_is_latched() {
        let device = Arc::new(Scripted::default());
        device
            .updates
            .lock()
            .unwrap()
            .push(DiscoveryUpdate::Failed(DeviceError::new("E", "boom")));

        let mut session = ReaderSession::new(device.clone(), &config(), SessionOptions::default());

        let first = session.ensure_ready().await.unwrap_err();
        assert!(matches!(first, SessionError::DiscoveryFailed { .. }));
        assert_eq!(first.to_string(), "discovery failed: [E]: boom");

        // the device would succeed now, but the session already settled
        *device.connected.lock().unwrap() = Some(reader("r1"));
        assert!(session.ensure_ready().await.is_err());
        assert_eq!(*device.discover_calls.lock().unwrap(), 1);
        assert!(session.state().is_failed());
    }

    #[tokio::test]
    async fn test_connect_first_candidate() {
        let device = Arc::new(Scripted::default());
        device
            .updates
            .lock()
            .unwrap()
            .push(DiscoveryUpdate::Readers(vec![reader("r1"), reader("r2")]));

        let mut session = ReaderSession::new(device, &config(), SessionOptions::default());

        let ready = session.ensure_ready().await.unwrap();
        assert_eq!(ready.serial_number, "r1");
        assert_eq!(session.state(), &SessionState::Connected);
    }
}
