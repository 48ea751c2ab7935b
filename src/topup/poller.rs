//! Settlement poller.
//!
//! The engine never sleeps; this is one way to drive it. It keeps polling a
//! single user's invoice until it settles, hits an error that polling cannot
//! fix, or runs out of attempts.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::engine::ReconciliationEngine;
use crate::config::TopupConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub attempts: u32,
    pub settled: bool,
    /// Reply text of the last poll
    pub last_reply: String,
}

#[derive(Debug, Clone)]
pub struct SettlementPoller {
    interval: Duration,
    max_polls: u32,
}

impl SettlementPoller {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls: max_polls.max(1),
        }
    }

    pub fn from_config(config: &TopupConfig) -> Self {
        Self::new(Duration::from_millis(config.poll_interval_ms), config.max_polls)
    }

    pub async fn run(&self, engine: &ReconciliationEngine, user_id: &str) -> PollReport {
        self.run_with(engine, user_id, |_, _| {}).await
    }

    /// Like [`run`](Self::run), calling `on_reply(attempt, reply)` after every poll
    pub async fn run_with<F>(
        &self,
        engine: &ReconciliationEngine,
        user_id: &str,
        mut on_reply: F,
    ) -> PollReport
    where
        F: FnMut(u32, &str),
    {
        let mut last_reply = String::new();

        for attempt in 1..=self.max_polls {
            let result = engine.poll_settlement(user_id).await;
            last_reply = match &result {
                Ok(outcome) => outcome.to_string(),
                Err(e) => e.to_string(),
            };
            on_reply(attempt, &last_reply);

            match result {
                Ok(outcome) if outcome.state().is_terminal() => {
                    info!(user_id, attempts = attempt, "Poller finished: settled");
                    return PollReport {
                        attempts: attempt,
                        settled: true,
                        last_reply,
                    };
                }
                Ok(_) => {
                    debug!(user_id, attempt, "Still waiting for deposit");
                }
                Err(e) if e.is_retryable() => {
                    debug!(user_id, attempt, code = e.code(), "Retryable poll failure");
                }
                Err(e) => {
                    warn!(user_id, attempt, code = e.code(), "Poller giving up: {}", e);
                    return PollReport {
                        attempts: attempt,
                        settled: false,
                        last_reply,
                    };
                }
            }

            if attempt < self.max_polls {
                sleep(self.interval).await;
            }
        }

        warn!(user_id, attempts = self.max_polls, "Poller exhausted attempts");
        PollReport {
            attempts: self.max_polls,
            settled: false,
            last_reply,
        }
    }
}
