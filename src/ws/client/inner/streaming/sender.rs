use tokio::sync::mpsc;

use super::EventStream;
use crate::ws::message::{PaymentEvent, PaymentRequest};

/// Decode frames and push actionable ones to the event stream.
#[derive(Debug, Clone)]
pub(crate) struct EventStreamSender {
    event_tx: mpsc::Sender<PaymentRequest>,
}

impl EventStreamSender {
    pub fn new(buffer: usize) -> (Self, EventStream) {
        let (event_tx, event_rx) = mpsc::channel(buffer.max(1));

        (Self { event_tx }, EventStream { rx: event_rx })
    }

    /// Decode a text frame and forward it when actionable.
    ///
    /// Returns false only when the receive side of the event stream dropped.
    pub async fn forward(&self, text: &str) -> bool {
        log::trace!("Received frame: {}", text);

        let request = match PaymentEvent::decode(text).into_request() {
            Ok(request) => request,
            Err(err) => {
                log::warn!("Drop feed message: {}", err);
                return true;
            }
        };

        log::debug!("Received payment event {}", request.payment_intent_id);

        self.event_tx.send(request).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.event_tx.is_closed()
    }
}
