//! Polling event source
//!
//! Calls a snapshot function on a fixed schedule and forwards what it returns.

use crate::error::TipStreamError;
use chainrpc_core::models::NotifyConfig;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Poll schedule: first tick after `initial_delay`, then every `interval`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(10),
        }
    }
}

impl From<&NotifyConfig> for PollConfig {
    fn from(config: &NotifyConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            interval: config.poll_interval(),
        }
    }
}

/// How a single poll went wrong
#[derive(Debug, Clone)]
pub enum PollFailure {
    /// Logged; the tick is skipped
    Transient(String),
    /// Ends the stream
    Fatal(String),
}

pub struct PollingSource;

impl PollingSource {
    /// Spawn the poll loop. Each `Ok(Some(_))` snapshot is sent on the returned
    /// channel; `Ok(None)` ticks are skipped. The loop ends on cancellation, on
    /// a fatal failure (sent as the last item) or when the receiver is dropped.
    pub fn spawn<T, F, Fut>(
        config: PollConfig,
        cancel: CancellationToken,
        mut poll: F,
    ) -> (mpsc::Receiver<Result<T, TipStreamError>>, JoinHandle<()>)
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, PollFailure>> + Send,
    {
        let (tx, rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + config.initial_delay, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => break,
                    outcome = poll() => outcome,
                };

                match outcome {
                    Ok(Some(snapshot)) => {
                        if tx.send(Ok(snapshot)).await.is_err() {
                            debug!("Poll receiver dropped");
                            break;
                        }
                    }
                    Ok(None) => debug!("Nothing to report this tick"),
                    Err(PollFailure::Transient(cause)) => {
                        warn!("Poll failed, retrying next tick: {}", cause)
                    }
                    Err(PollFailure::Fatal(cause)) => {
                        error!("Poll failed, stopping: {}", cause);
                        let _ = tx.send(Err(TipStreamError::Upstream(cause))).await;
                        break;
                    }
                }
            }
            debug!("Poll loop stopped");
        });

        (rx, handle)
    }
}
