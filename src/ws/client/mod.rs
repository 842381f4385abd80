mod inner;

pub use inner::{ConnectGatewayError, ConnectionError, EventStream};

use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};
use tokio_tungstenite as websocket;

use crate::config::ConfigStore;
use inner::{Command, Supervisor};

pub(crate) type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Lifecycle state of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// no connection and nothing scheduled
    Idle,
    /// websocket handshake in progress
    Connecting,
    /// connected, receiving events
    Open,
    /// server sent a close frame, acknowledging it
    Closing,
    /// connection lost, waiting for backoff timer
    ReconnectScheduled,
}

/// Feed client tunables.
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// use `wss`, plain `ws` otherwise
    pub secure: bool,
    /// first reconnect delay, restored after every successful open
    pub backoff_floor: Duration,
    /// reconnect delay ceiling
    pub backoff_ceiling: Duration,
    /// liveness ping interval, an unanswered ping at next tick breaks the connection
    pub ping_interval: Duration,
    /// timeout of tcp connect plus websocket handshake
    pub connect_timeout: Duration,
    /// capacity of event stream buffer
    pub event_buffer: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            secure: true,
            backoff_floor: Duration::from_millis(500),
            backoff_ceiling: Duration::from_millis(8000),
            ping_interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            event_buffer: 32,
        }
    }
}

/// Event feed client handle.
///
/// All connection state is owned by a background supervisor task, this handle
/// only posts commands to it, so no method blocks. Dropping the handle stops
/// the supervisor and closes the connection.
#[derive(Debug)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl Client {
    /// Create a client reading its config from `store`, returning the handle and
    /// the stream of actionable payment events.
    ///
    /// Must be called inside a tokio runtime. The client stays idle until
    /// [`Client::start`].
    pub fn new(store: Arc<dyn ConfigStore>, options: ClientOptions) -> (Self, EventStream) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let (supervisor, events) = Supervisor::new(store, options, state_tx);
        tokio::spawn(supervisor.run(commands_rx));

        (
            Self {
                commands: commands_tx,
                state: state_rx,
            },
            events,
        )
    }

    /// (Re)open the feed connection, any existing connection is cancelled first.
    ///
    /// Silently stays idle when origin or tenant id is not configured.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Close the feed connection and cancel pending reconnect.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// watch connection state changes
    pub fn state_watcher(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("Feed supervisor already stopped, command ignored");
        }
    }
}
