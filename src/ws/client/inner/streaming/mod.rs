mod pinger;
mod sender;
mod stream;

pub(crate) use sender::EventStreamSender;

pub use stream::{ConnectionError, EventStream};

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{protocol::CloseFrame, Message};

use super::{supervisor::Link, ClientInner};
use crate::ws::client::WebsocketClient;
use pinger::Pinger;

/// close code used when server close frame carries no status
const NO_STATUS_CODE: u16 = 1005;

#[derive(Debug)]
pub(crate) struct ClientStateStreaming {
    pub ws: WebsocketClient,
    pub sender: EventStreamSender,
    pub link: Link,
    pub ping_interval: Duration,
}

impl ClientInner<ClientStateStreaming> {
    /// Receive frames until the connection breaks, returning the reason.
    pub async fn streaming(mut self) -> ConnectionError {
        log::debug!("Streaming start");

        let mut pinger = Pinger::new(self.state.ping_interval);

        loop {
            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(pinger.next_tick()) => {
                    if let Err(err) = pinger.tick() {
                        log::warn!("Feed liveness check failed: {}", err);
                        return err;
                    }

                    log::trace!("Send ping");

                    if let Err(err) = self.state.ws.send(Message::Ping(Vec::new())).await {
                        log::debug!("Find websocket broken when send ping: {}", err);
                        return ConnectionError::Websocket { source: err };
                    }
                }

                frame = self.state.ws.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => {
                            log::debug!("Find websocket broken when receive frame: {}", err);
                            return ConnectionError::Websocket { source: err };
                        }
                        None => return ConnectionError::StreamEnded,
                    };

                    match message {
                        Message::Text(text) => {
                            if !self.state.sender.forward(&text).await {
                                log::debug!("Event stream receive side dropped, stop");
                                return ConnectionError::EventStreamClosed;
                            }
                        }
                        Message::Pong(_) => {
                            log::trace!("Received pong");
                            pinger.pong();
                        }
                        Message::Ping(_) => {
                            log::trace!("Received ping, pong is queued by websocket");
                        }
                        Message::Close(frame) => {
                            return self.acknowledge_close(frame).await;
                        }
                        _ => {
                            log::debug!("Ignore non-text frame");
                        }
                    }
                }
            }
        }
    }

    /// Echo server close code and reason back before the transport finalizes.
    async fn acknowledge_close(&mut self, frame: Option<CloseFrame<'static>>) -> ConnectionError {
        let (code, reason) = frame
            .as_ref()
            .map(|f| (u16::from(f.code), f.reason.to_string()))
            .unwrap_or((NO_STATUS_CODE, String::new()));

        log::info!("Feed closing: {} {}", code, reason);

        self.state.link.closing(code, &reason);

        // best effort, the peer may already be gone
        if let Err(err) = self.state.ws.close(frame).await {
            log::debug!("Acknowledge close failed, ignored: {}", err);
        }

        ConnectionError::ServerClosed { code, reason }
    }
}
