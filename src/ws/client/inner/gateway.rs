use std::time::Duration;

use snafu::prelude::*;
use tokio_tungstenite as websocket;

use super::{
    streaming::{ClientStateStreaming, EventStreamSender},
    supervisor::Link,
    ClientInner, ConnectionError,
};
use crate::ws::ClientOptions;

/// Error when connect to feed websocket
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ConnectGatewayError {
    /// websocket handshake failed
    #[snafu(display("connect feed {url} failed: {source}"))]
    Handshake {
        /// connected url
        url: String,
        /// source error
        source: websocket::tungstenite::Error,
    },

    /// handshake not finished in time
    #[snafu(display("connect feed {url} timeout after {timeout:?}"))]
    Timeout {
        /// connected url
        url: String,
        /// waited time
        timeout: Duration,
    },
}

#[derive(Debug)]
pub(crate) struct ClientStateGateway {
    pub url: url::Url,
    pub options: ClientOptions,
}

impl ClientInner<ClientStateGateway> {
    pub async fn connect(
        self,
        sender: EventStreamSender,
        link: Link,
    ) -> Result<ClientInner<ClientStateStreaming>, ConnectGatewayError> {
        let u = self.state.url.to_string();
        let timeout = self.state.options.connect_timeout;

        log::debug!("Connecting feed: {}", u);

        let ws = tokio::time::timeout(timeout, websocket::connect_async(self.state.url))
            .await
            .map_err(|_| error::Timeout { url: &u, timeout }.build())?
            .map(|(client, _)| client)
            .with_context(|_| error::Handshake { url: &u })?;

        log::debug!("Move to streaming state");

        Ok(ClientInner {
            state: ClientStateStreaming {
                ws,
                sender,
                link,
                ping_interval: self.state.options.ping_interval,
            },
        })
    }

    /// Body of a connection task: connect, stream until broken, report to supervisor.
    pub async fn run(self, sender: EventStreamSender, link: Link) {
        let reporter = link.clone();

        let client = match self.connect(sender, link).await {
            Ok(client) => client,
            Err(err) => {
                reporter.broken(ConnectionError::ConnectGatewayFailed { source: err });
                return;
            }
        };

        reporter.opened();

        let reason = client.streaming().await;

        reporter.broken(reason);
    }
}
