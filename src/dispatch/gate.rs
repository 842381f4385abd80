use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;

use crate::ws::PaymentRequest;

/// Single-flight admission with a fixed cooldown.
///
/// An admitted request keeps the gate busy for `cooldown`, no matter whether
/// its collection finished. A stuck collection therefore can't block later
/// requests for longer than one cooldown.
#[derive(Debug)]
pub struct AdmissionGate {
    cooldown: Duration,
    busy_until: Mutex<Option<Instant>>,
}

impl AdmissionGate {
    /// Create a clear gate.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            busy_until: Mutex::new(None),
        }
    }

    /// Admit `request` if the gate is clear, marking it busy for one cooldown.
    pub fn try_admit(&self, request: &PaymentRequest) -> bool {
        let now = Instant::now();
        let mut busy_until = self.busy_until.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(until) = *busy_until {
            if now < until {
                log::info!(
                    "Busy, drop payment event {}",
                    request.payment_intent_id
                );
                return false;
            }
        }

        *busy_until = Some(now + self.cooldown);

        log::debug!("Admitted payment event {}", request.payment_intent_id);

        true
    }

    /// whether a request was admitted less than one cooldown ago
    pub fn is_busy(&self) -> bool {
        let busy_until = self.busy_until.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*busy_until, Some(until) if Instant::now() < until)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ws::PaymentEvent;

    fn request(id: &str) -> PaymentRequest {
        PaymentEvent {
            payment_intent_id: Some(id.to_string()),
            client_secret: Some(format!("{}_secret_x", id)),
            ..Default::default()
        }
        .into_request()
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_in_cooldown_dropped() {
        let gate = AdmissionGate::new(Duration::from_millis(500));

        assert!(!gate.is_busy());
        assert!(gate.try_admit(&request("pi_1")));
        assert!(gate.is_busy());

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(!gate.try_admit(&request("pi_2")));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!gate.is_busy());
        assert!(gate.try_admit(&request("pi_3")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_does_not_extend_cooldown() {
        let gate = AdmissionGate::new(Duration::from_millis(500));

        assert!(gate.try_admit(&request("pi_1")));
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(!gate.try_admit(&request("pi_1")));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(gate.try_admit(&request("pi_1")));
    }
}
