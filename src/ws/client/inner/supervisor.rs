use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use super::{
    backoff::Backoff,
    init::{ClientStateInit, FeedURLError},
    streaming::EventStreamSender,
    ClientInner, ConnectionError, EventStream,
};
use crate::{
    config::{ConfigStore, ConnectionConfig},
    ws::{ClientOptions, ConnectionState},
};

#[derive(Debug)]
pub(crate) enum Command {
    Start,
    Stop,
}

#[derive(Debug)]
pub(crate) enum ReportKind {
    Opened,
    Closing { code: u16, reason: String },
    Broken(ConnectionError),
}

#[derive(Debug)]
pub(crate) enum Report {
    Connection { generation: u64, kind: ReportKind },
    ReconnectDue { token: u64 },
}

/// Report channel from one connection task back to the supervisor.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    generation: u64,
    reports: mpsc::UnboundedSender<Report>,
}

impl Link {
    fn report(&self, kind: ReportKind) {
        // supervisor gone means client dropped, nobody cares about this report
        let _ = self.reports.send(Report::Connection {
            generation: self.generation,
            kind,
        });
    }

    pub fn opened(&self) {
        self.report(ReportKind::Opened)
    }

    pub fn closing(&self, code: u16, reason: &str) {
        self.report(ReportKind::Closing {
            code,
            reason: reason.to_string(),
        })
    }

    pub fn broken(&self, err: ConnectionError) {
        self.report(ReportKind::Broken(err))
    }
}

#[derive(Debug)]
struct PendingReconnect {
    token: u64,
    handle: JoinHandle<()>,
}

/// Single owner of connection state, backoff, the live connection task and the
/// reconnect timer.
#[derive(Debug)]
pub(crate) struct Supervisor {
    store: Arc<dyn ConfigStore>,
    options: ClientOptions,
    state: watch::Sender<ConnectionState>,
    sender: EventStreamSender,
    reports_tx: mpsc::UnboundedSender<Report>,
    reports_rx: mpsc::UnboundedReceiver<Report>,
    backoff: Backoff,
    generation: u64,
    connection: Option<JoinHandle<()>>,
    reconnect: Option<PendingReconnect>,
    reconnect_token: u64,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        options: ClientOptions,
        state: watch::Sender<ConnectionState>,
    ) -> (Self, EventStream) {
        let (sender, events) = EventStreamSender::new(options.event_buffer);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();

        let supervisor = Self {
            store,
            options,
            state,
            sender,
            reports_tx,
            reports_rx,
            backoff: Backoff::new(options.backoff_floor, options.backoff_ceiling),
            generation: 0,
            connection: None,
            reconnect: None,
            reconnect_token: 0,
        };

        (supervisor, events)
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        log::debug!("Feed supervisor start");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Start) => {
                        self.cancel_reconnect();
                        self.start();
                    }
                    Some(Command::Stop) => {
                        log::info!("Feed stop requested");
                        self.stop();
                    }
                    None => {
                        log::debug!("Client handle dropped, stop");
                        break;
                    }
                },

                Some(report) = self.reports_rx.recv() => self.on_report(report),
            }
        }

        self.stop();
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.state.send_replace(state);
        if prev != state {
            log::debug!("Feed move to {:?} state", state);
        }
    }

    fn start(&mut self) {
        self.cancel_connection();

        let inner = ClientInner {
            state: ClientStateInit {
                config: ConnectionConfig::snapshot(&*self.store),
                options: self.options,
            },
        };

        let gateway = match inner.into_gateway() {
            Ok(gateway) => gateway,
            Err(FeedURLError::Unconfigured) => {
                log::debug!("Feed origin or tenant id not configured, stay idle");
                self.set_state(ConnectionState::Idle);
                return;
            }
            Err(err) => {
                log::warn!("Can't build feed url, stay idle: {}", err);
                self.set_state(ConnectionState::Idle);
                return;
            }
        };

        self.generation += 1;

        let link = Link {
            generation: self.generation,
            reports: self.reports_tx.clone(),
        };

        log::info!("Connecting feed, attempt {}", self.generation);

        self.set_state(ConnectionState::Connecting);
        self.connection = Some(tokio::spawn(gateway.run(self.sender.clone(), link)));
    }

    fn stop(&mut self) {
        self.cancel_reconnect();
        self.cancel_connection();
        self.set_state(ConnectionState::Idle);
    }

    /// Best effort, abort never fails and a finished task is fine.
    fn cancel_connection(&mut self) {
        if let Some(handle) = self.connection.take() {
            log::debug!("Cancel feed connection {}", self.generation);
            handle.abort();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.reconnect.take() {
            log::debug!("Cancel pending reconnect");
            pending.handle.abort();
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect.is_some() {
            log::debug!("Reconnect already pending");
            return;
        }

        self.cancel_connection();

        let delay = self.backoff.next_delay();

        self.reconnect_token += 1;
        let token = self.reconnect_token;
        let reports = self.reports_tx.clone();

        log::info!("Scheduling feed reconnect in {:?}", delay);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = reports.send(Report::ReconnectDue { token });
        });

        self.reconnect = Some(PendingReconnect { token, handle });
        self.set_state(ConnectionState::ReconnectScheduled);
    }

    fn on_report(&mut self, report: Report) {
        match report {
            Report::ReconnectDue { token } => {
                if self.reconnect.as_ref().map(|pending| pending.token) != Some(token) {
                    log::trace!("Ignore stale reconnect timer {}", token);
                    return;
                }

                self.reconnect = None;
                log::debug!("Reconnect timer fired");
                self.start();
            }

            Report::Connection { generation, kind } => {
                if generation != self.generation || self.connection.is_none() {
                    log::trace!("Ignore report from stale connection {}", generation);
                    return;
                }

                match kind {
                    ReportKind::Opened => {
                        log::info!("Feed connected");
                        self.backoff.reset();
                        log::trace!("Backoff reset to {:?}", self.backoff.current());
                        self.set_state(ConnectionState::Open);
                    }
                    ReportKind::Closing { code, reason } => {
                        log::debug!("Feed closing by server: {} {}", code, reason);
                        self.set_state(ConnectionState::Closing);
                    }
                    ReportKind::Broken(err) => {
                        log::warn!("Feed connection broken: {}", err);

                        // the task ends right after this report
                        self.connection = None;

                        if self.sender.is_closed() {
                            log::info!("Event stream dropped, feed stop");
                            self.stop();
                            return;
                        }

                        self.schedule_reconnect();
                    }
                }
            }
        }
    }
}
