///! Retrying delivery of notification text to the sink
///!
///! Failures back off exponentially and "retry after" answers are honoured
///! verbatim. Markup errors stop immediately. A failed delivery is logged and
///! reported, never propagated as an error.

use crate::config::DeliveryConfig;
use crate::utils::{Disposition, MessageSink, SinkError};
use std::sync::Arc;
use uuid::Uuid;

/// Result of one `deliver` call
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: SinkError },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Book-keeping for one message while it is being delivered
struct DeliveryAttempt<'a> {
    id: Uuid,
    text: &'a str,
    target: String,
    /// Sends performed so far
    sends: u32,
    /// Transient failures so far (drives the backoff exponent)
    failures: u32,
    rate_limit_waits: u32,
}

pub struct DeliverySender {
    sink: Arc<dyn MessageSink>,
    config: DeliveryConfig,
}

impl DeliverySender {
    pub fn new(sink: Arc<dyn MessageSink>, config: DeliveryConfig) -> Self {
        Self { sink, config }
    }

    /// Deliver `text`, then pause for the configured throttle interval.
    pub async fn deliver(&self, text: &str) -> DeliveryOutcome {
        let outcome = self.deliver_with_retry(text).await;
        tokio::time::sleep(self.config.throttle()).await;
        outcome
    }

    async fn deliver_with_retry(&self, text: &str) -> DeliveryOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = DeliveryAttempt {
            id: Uuid::now_v7(),
            text,
            target: self.sink.target(),
            sends: 0,
            failures: 0,
            rate_limit_waits: 0,
        };

        loop {
            attempt.sends += 1;
            let error = match self.sink.send(attempt.text).await {
                Ok(()) => {
                    tracing::info!(
                        "Message {} sent to {} on attempt {}",
                        attempt.id,
                        attempt.target,
                        attempt.sends
                    );
                    return DeliveryOutcome::Delivered { attempts: attempt.sends };
                }
                Err(e) => e,
            };

            match error.disposition() {
                Disposition::GiveUp => {
                    tracing::error!(
                        "Message {} to {} rejected permanently: {}",
                        attempt.id,
                        attempt.target,
                        error
                    );
                    return DeliveryOutcome::Failed { attempts: attempt.sends, error };
                }
                Disposition::Wait(wait) => {
                    attempt.rate_limit_waits += 1;
                    if attempt.rate_limit_waits > self.config.max_rate_limit_waits {
                        tracing::error!(
                            "Message {} still rate limited after {} waits. Giving up.",
                            attempt.id,
                            self.config.max_rate_limit_waits
                        );
                        return DeliveryOutcome::Failed { attempts: attempt.sends, error };
                    }
                    tracing::warn!(
                        "Rate limited. Retrying message {} after {} seconds.",
                        attempt.id,
                        wait.as_secs()
                    );
                    tokio::time::sleep(wait).await;
                }
                Disposition::Retry => {
                    attempt.failures += 1;
                    if attempt.failures >= max_attempts {
                        tracing::error!(
                            "Failed to send message {} after {} attempts: {}. Giving up.",
                            attempt.id,
                            attempt.failures,
                            error
                        );
                        return DeliveryOutcome::Failed { attempts: attempt.sends, error };
                    }

                    let delay = self.config.backoff(attempt.failures);
                    if error.is_network() {
                        tracing::warn!(
                            "Network error on attempt {}/{}: {}. Retrying in {}s...",
                            attempt.failures,
                            max_attempts,
                            error,
                            delay.as_secs()
                        );
                    } else {
                        tracing::error!(
                            "Unexpected error on attempt {}/{}: {}. Retrying in {}s...",
                            attempt.failures,
                            max_attempts,
                            error,
                            delay.as_secs()
                        );
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
