use std::{task::Poll, time::Duration};

use futures_util::Stream;
use snafu::prelude::*;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use super::super::ConnectGatewayError;
use crate::ws::message::PaymentRequest;

/// Reason a feed connection ended, every one of them leads to a backoff reconnect.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ConnectionError {
    /// connect to feed failed
    #[snafu(display("connect feed failed: {source}"))]
    ConnectGatewayFailed {
        /// source error
        source: ConnectGatewayError,
    },

    /// underlying websocket broken
    #[snafu(display("underlying websocket broken: {source}"))]
    Websocket {
        /// source error
        source: tungstenite::Error,
    },

    /// server closed the connection with a close frame
    #[snafu(display("server closed feed, code {code}, reason: {reason}"))]
    ServerClosed {
        /// close code
        code: u16,
        /// close reason
        reason: String,
    },

    /// websocket ended without close frame
    #[snafu(display("feed websocket ended"))]
    StreamEnded,

    /// no pong for the previous ping
    #[snafu(display("no pong received within {waited:?}"))]
    PongTimeout {
        /// ping interval
        waited: Duration,
    },

    /// event stream receive side dropped
    #[snafu(display("event stream dropped"))]
    EventStreamClosed,
}

/// Stream of actionable payment events, in feed arrival order per connection.
#[derive(Debug)]
pub struct EventStream {
    pub(crate) rx: mpsc::Receiver<PaymentRequest>,
}

impl Stream for EventStream {
    type Item = PaymentRequest;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
