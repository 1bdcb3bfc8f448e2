//! Chain tip notifications
//!
//! [`ChainTipService`] watches the active chain tip, either by polling
//! `getchaintips` or by re-querying whenever the node publishes a new block,
//! and tells every subscriber about each change of tip.

use crate::distinct::DistinctUntilChanged;
use crate::error::{Result, TipStreamError};
use crate::poll::{PollConfig, PollFailure, PollingSource};
use crate::push::{TopicDemux, TopicStream};
use async_trait::async_trait;
use chainrpc_client::{ClientError, RpcClient};
use chainrpc_core::models::{ChainTip, NotifyConfig, Topic};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Queue length of each subscriber unless configured otherwise
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 16;

/// Source of the current active chain tip
#[async_trait]
pub trait ChainTipQuery: Send + Sync + 'static {
    /// The active tip, or `None` when the node reports none
    async fn current_tip(&self) -> std::result::Result<Option<ChainTip>, ClientError>;
}

#[async_trait]
impl ChainTipQuery for RpcClient {
    async fn current_tip(&self) -> std::result::Result<Option<ChainTip>, ClientError> {
        let tips: Vec<ChainTip> = self.send("getchaintips", vec![]).await?;
        Ok(ChainTip::find_active(&tips).cloned())
    }
}

#[async_trait]
impl<T: ChainTipQuery> ChainTipQuery for Arc<T> {
    async fn current_tip(&self) -> std::result::Result<Option<ChainTip>, ClientError> {
        (**self).current_tip().await
    }
}

fn classify(e: ClientError) -> PollFailure {
    if e.is_fatal() {
        PollFailure::Fatal(e.to_string())
    } else {
        PollFailure::Transient(e.to_string())
    }
}

enum Strategy {
    Polling { config: PollConfig },
    Push {
        demux: Arc<TopicDemux>,
        trigger: Topic,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    /// Upstream completed or failed
    Finished,
    Closed,
}

struct Subscriber {
    tx: mpsc::Sender<ChainTip>,
    outcome: Arc<OnceLock<TipStreamError>>,
}

struct Shared {
    phase: Phase,
    latest: Option<ChainTip>,
    subscribers: Vec<Subscriber>,
    failure: Option<TipStreamError>,
}

pub struct ChainTipService {
    query: Arc<dyn ChainTipQuery>,
    strategy: Strategy,
    capacity: usize,
    cancel: CancellationToken,
    shared: Arc<Mutex<Shared>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChainTipService {
    /// Poll `query` on the schedule in `config`.
    pub fn polling(query: impl ChainTipQuery, config: PollConfig) -> Self {
        Self::with_strategy(Arc::new(query), Strategy::Polling { config })
    }

    /// Polling service with the schedule and queue length from `config`
    pub fn polling_from_config(query: impl ChainTipQuery, config: &NotifyConfig) -> Self {
        Self::polling(query, PollConfig::from(config)).with_capacity(config.subscriber_capacity)
    }

    /// Query once at start, then again on every `hashblock` message of `demux`.
    pub fn push(demux: TopicDemux, query: impl ChainTipQuery) -> Self {
        Self::with_strategy(
            Arc::new(query),
            Strategy::Push {
                demux: Arc::new(demux),
                trigger: Topic::HashBlock,
            },
        )
    }

    fn with_strategy(query: Arc<dyn ChainTipQuery>, strategy: Strategy) -> Self {
        Self {
            query,
            strategy,
            capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            cancel: CancellationToken::new(),
            shared: Arc::new(Mutex::new(Shared {
                phase: Phase::Idle,
                latest: None,
                subscribers: Vec::new(),
                failure: None,
            })),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Queue length of each subscriber
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Re-query on `topic` instead of `hashblock` (push strategy only)
    pub fn with_trigger(mut self, topic: Topic) -> Self {
        if let Strategy::Push { ref mut trigger, .. } = self.strategy {
            *trigger = topic;
        }
        self
    }

    /// Last tip handed to subscribers
    pub fn latest(&self) -> Option<ChainTip> {
        lock(&self.shared).latest.clone()
    }

    pub fn is_started(&self) -> bool {
        lock(&self.shared).phase != Phase::Idle
    }

    /// Start watching. Happens on the first `subscribe()` anyway; calling it
    /// again is a no-op. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut shared = lock(&self.shared);
        match shared.phase {
            Phase::Idle => {}
            Phase::Closed => return Err(TipStreamError::Closed),
            Phase::Running | Phase::Finished => return Ok(()),
        }

        let (events, source_task) = match self.strategy {
            Strategy::Polling { config } => {
                let query = self.query.clone();
                PollingSource::spawn(config, self.cancel.clone(), move || {
                    let query = query.clone();
                    async move { query.current_tip().await.map_err(classify) }
                })
            }
            Strategy::Push { ref demux, trigger } => {
                let stream = demux.subscribe(trigger)?;
                spawn_push(self.query.clone(), stream, self.cancel.clone())
            }
        };

        let driver = tokio::spawn(drive(events, self.shared.clone(), self.cancel.clone()));
        shared.phase = Phase::Running;
        drop(shared);

        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.push(source_task);
        tasks.push(driver);
        info!("Chain tip service started");
        Ok(())
    }

    /// New subscription. A subscriber joining after a tip was published
    /// receives that tip first.
    pub fn subscribe(&self) -> Result<TipSubscription> {
        self.start()?;

        let mut shared = lock(&self.shared);
        if shared.phase == Phase::Closed {
            return Err(TipStreamError::Closed);
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let outcome = Arc::new(OnceLock::new());
        if let Some(ref tip) = shared.latest {
            let _ = tx.try_send(tip.clone());
        }

        if shared.phase == Phase::Running {
            shared.subscribers.push(Subscriber {
                tx,
                outcome: outcome.clone(),
            });
        } else if let Some(ref failure) = shared.failure {
            let _ = outcome.set(failure.clone());
        }

        debug!(
            "New chain tip subscriber ({} active)",
            shared.subscribers.len()
        );
        Ok(TipSubscription {
            rx,
            outcome,
            done: false,
        })
    }

    /// Stop watching and end every subscription. Waits for the receive
    /// thread of a push feed to finish.
    pub async fn close(&self) {
        self.cancel.cancel();
        {
            let mut shared = lock(&self.shared);
            if shared.phase == Phase::Closed {
                return;
            }
            shared.phase = Phase::Closed;
            shared.subscribers.clear();
        }

        if let Strategy::Push { ref demux, .. } = self.strategy {
            let demux = demux.clone();
            let joined = tokio::task::spawn_blocking(move || demux.close()).await;
            if joined.is_err() {
                error!("Failed to close push feed");
            }
        }

        let tasks: Vec<_> = match self.tasks.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for task in tasks {
            if let Err(e) = task.await {
                error!("Chain tip task failed: {}", e);
            }
        }
        info!("Chain tip service closed");
    }
}

impl Drop for ChainTipService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn spawn_push(
    query: Arc<dyn ChainTipQuery>,
    mut stream: TopicStream,
    cancel: CancellationToken,
) -> (mpsc::Receiver<Result<ChainTip>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);

    let handle = tokio::spawn(async move {
        // Query once up front so subscribers need not wait for the next block
        let mut trigger = Some(stream.topic());
        loop {
            if let Some(topic) = trigger.take() {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => break,
                    outcome = query.current_tip() => outcome,
                };
                match outcome.map_err(classify) {
                    Ok(Some(tip)) => {
                        if tx.send(Ok(tip)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!("No active tip after {}", topic),
                    Err(PollFailure::Transient(cause)) => {
                        warn!("Chain tip query failed: {}", cause)
                    }
                    Err(PollFailure::Fatal(cause)) => {
                        let _ = tx.send(Err(TipStreamError::Upstream(cause))).await;
                        break;
                    }
                }
            }

            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = stream.recv() => message,
            };
            match message {
                Some(Ok(message)) => {
                    debug!("{} notification #{}", message.topic, message.sequence);
                    trigger = Some(message.topic);
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(e.into())).await;
                    break;
                }
                None => break,
            }
        }
        debug!("Push listener stopped");
    });

    (rx, handle)
}

async fn drive(
    mut events: mpsc::Receiver<Result<ChainTip>>,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
) {
    let mut filter = DistinctUntilChanged::new();

    let failure = loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Some(Ok(tip)) => {
                if filter.check(tip.hash) {
                    info!(
                        "** NEW ** blockheight {}, blockhash {}",
                        tip.height, tip.hash
                    );
                    publish(&shared, tip);
                }
            }
            Some(Err(e)) => {
                error!("Chain tip stream failed: {}", e);
                break Some(e);
            }
            None => {
                info!("Chain tip stream ended");
                break None;
            }
        }
    };

    let mut shared = lock(&shared);
    if shared.phase != Phase::Running {
        return;
    }
    shared.phase = Phase::Finished;
    for subscriber in shared.subscribers.drain(..) {
        if let Some(ref e) = failure {
            let _ = subscriber.outcome.set(e.clone());
        }
    }
    shared.failure = failure;
}

fn publish(shared: &Mutex<Shared>, tip: ChainTip) {
    let mut shared = lock(shared);
    shared.latest = Some(tip.clone());
    shared.subscribers.retain(|subscriber| {
        match subscriber.tx.try_send(tip.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Chain tip subscriber is not keeping up, dropping it");
                let _ = subscriber.outcome.set(TipStreamError::Overflow);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    });
}

/// Receives each new active chain tip
pub struct TipSubscription {
    rx: mpsc::Receiver<ChainTip>,
    outcome: Arc<OnceLock<TipStreamError>>,
    done: bool,
}

impl TipSubscription {
    /// Next tip, the error that ended the subscription, or `None` once it ended
    /// normally. Tips queued before an error are delivered first.
    pub async fn recv(&mut self) -> Option<Result<ChainTip>> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(tip) => Some(Ok(tip)),
            None => {
                self.done = true;
                self.outcome.get().cloned().map(Err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainrpc_client::TransportError;
    use chainrpc_core::models::BlockHash;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn tip(height: u64, byte: u8) -> ChainTip {
        ChainTip::active(height, BlockHash::from_bytes([byte; 32]))
    }

    /// Answers from a script, then repeats the last answer
    struct Scripted {
        answers: Mutex<VecDeque<std::result::Result<Option<ChainTip>, ClientError>>>,
        last: Mutex<Option<ChainTip>>,
    }

    impl Scripted {
        fn new(answers: Vec<std::result::Result<Option<ChainTip>, ClientError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ChainTipQuery for Scripted {
        async fn current_tip(&self) -> std::result::Result<Option<ChainTip>, ClientError> {
            let next = self.answers.lock().unwrap().pop_front();
            match next {
                Some(answer) => {
                    if let Ok(Some(ref tip)) = answer {
                        *self.last.lock().unwrap() = Some(tip.clone());
                    }
                    answer
                }
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }
    }

    fn fast() -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(10),
            interval: Duration::from_millis(50),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_emits_only_changes() {
        let a = tip(100, 0xaa);
        let b = tip(101, 0xbb);
        let c = tip(101, 0xcc);
        let query = Scripted::new(vec![
            Ok(Some(a.clone())),
            Ok(Some(a.clone())),
            Ok(Some(b.clone())),
            Ok(Some(c.clone())),
            Ok(Some(c.clone())),
            Ok(Some(b.clone())),
        ]);
        let service = ChainTipService::polling(query, fast());
        let mut sub = service.subscribe().unwrap();

        for expected in [&a, &b, &c, &b] {
            assert_eq!(&sub.recv().await.unwrap().unwrap(), expected);
        }
        assert_eq!(service.latest(), Some(b));

        service.close().await;
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_from_config() {
        let config = NotifyConfig {
            initial_delay_ms: 2_000,
            ..NotifyConfig::default()
        };
        let a = tip(3, 0x03);
        let service =
            ChainTipService::polling_from_config(Scripted::new(vec![Ok(Some(a.clone()))]), &config);
        assert_eq!(service.capacity, config.subscriber_capacity);

        let start = tokio::time::Instant::now();
        let mut sub = service.subscribe().unwrap();
        assert_eq!(sub.recv().await.unwrap().unwrap(), a);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        service.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_start_and_late_subscriber() {
        let a = tip(7, 0x07);
        let service = ChainTipService::polling(Scripted::new(vec![Ok(Some(a.clone()))]), fast());
        assert!(!service.is_started());

        let mut first = service.subscribe().unwrap();
        assert!(service.is_started());
        assert_eq!(first.recv().await.unwrap().unwrap(), a);

        let mut late = service.subscribe().unwrap();
        assert_eq!(late.recv().await.unwrap().unwrap(), a);

        service.close().await;
        assert!(matches!(service.subscribe(), Err(TipStreamError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_skipped() {
        let a = tip(1, 0x01);
        let refused = TransportError::Connect("refused".to_string());
        let query = Scripted::new(vec![
            Err(ClientError::Transport(refused)),
            Ok(None),
            Ok(Some(a.clone())),
        ]);
        let service = ChainTipService::polling(query, fast());
        let mut sub = service.subscribe().unwrap();
        assert_eq!(sub.recv().await.unwrap().unwrap(), a);
        service.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_ends_every_subscriber() {
        let a = tip(1, 0x01);
        let query = Scripted::new(vec![
            Ok(Some(a.clone())),
            Err(ClientError::Transport(TransportError::Unauthorized(401))),
        ]);
        let service = ChainTipService::polling(query, fast());
        let mut one = service.subscribe().unwrap();
        let mut two = service.subscribe().unwrap();

        assert_eq!(one.recv().await.unwrap().unwrap(), a);
        assert!(matches!(
            one.recv().await,
            Some(Err(TipStreamError::Upstream(_)))
        ));
        assert!(one.recv().await.is_none());

        assert_eq!(two.recv().await.unwrap().unwrap(), a);
        assert!(matches!(
            two.recv().await,
            Some(Err(TipStreamError::Upstream(_)))
        ));

        let mut late = service.subscribe().unwrap();
        assert_eq!(late.recv().await.unwrap().unwrap(), a);
        assert!(matches!(
            late.recv().await,
            Some(Err(TipStreamError::Upstream(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_overflows_after_draining() {
        let tips: Vec<_> = (0..5u8).map(|i| tip(i as u64, i)).collect();
        let query = Scripted::new(tips.iter().cloned().map(|t| Ok(Some(t))).collect());
        let service = ChainTipService::polling(query, fast()).with_capacity(2);

        let mut slow = service.subscribe().unwrap();
        let mut fast_sub = service.subscribe().unwrap();

        for expected in &tips {
            assert_eq!(&fast_sub.recv().await.unwrap().unwrap(), expected);
        }

        assert_eq!(slow.recv().await.unwrap().unwrap(), tips[0]);
        assert_eq!(slow.recv().await.unwrap().unwrap(), tips[1]);
        assert!(matches!(
            slow.recv().await,
            Some(Err(TipStreamError::Overflow))
        ));
        assert!(slow.recv().await.is_none());

        service.close().await;
    }
}
