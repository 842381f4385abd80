use std::time::Duration;

use snafu::prelude::*;
use tokio::time::Instant;

use super::stream::{error, ConnectionError};

/// Liveness ping schedule.
///
/// A ping is sent every interval, if the previous one got no pong when the next
/// tick arrives, the connection is considered dead.
#[derive(Debug)]
pub(crate) struct Pinger {
    interval: Duration,
    next_tick: Instant,
    awaiting_pong: bool,
}

impl Pinger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_tick: Instant::now() + interval,
            awaiting_pong: false,
        }
    }

    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// Tick arrived, caller should send a ping if this returns Ok.
    pub fn tick(&mut self) -> Result<(), ConnectionError> {
        ensure!(
            !self.awaiting_pong,
            error::PongTimeout {
                waited: self.interval
            }
        );

        self.awaiting_pong = true;
        self.next_tick = Instant::now() + self.interval;

        Ok(())
    }

    pub fn pong(&mut self) {
        self.awaiting_pong = false;
    }
}
