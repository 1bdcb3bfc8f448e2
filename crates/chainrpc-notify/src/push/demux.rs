use super::frame::decode_message;
use super::{FrameSource, Received};
use crate::error::FeedError;
use chainrpc_core::models::{NotifyConfig, Topic, TopicMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long the receive thread blocks before checking for cancellation
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

type Output = broadcast::Sender<Result<TopicMessage, FeedError>>;

#[derive(Default)]
struct Outputs {
    /// `None` once the source has ended or failed
    senders: Option<HashMap<Topic, Output>>,
    failure: Option<FeedError>,
}

/// Demultiplexes one frame source into per-topic streams.
///
/// The receive thread is the only writer of each topic channel. Slow readers
/// skip ahead to the newest retained messages rather than stall the thread.
pub struct TopicDemux {
    topics: Vec<Topic>,
    outputs: Arc<Mutex<Outputs>>,
    cancel: CancellationToken,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TopicDemux {
    /// Subscribe `source` to `topics` and start the receive thread.
    /// `capacity` bounds how many messages each topic retains for a slow reader.
    pub fn new<S>(mut source: S, topics: &[Topic], capacity: usize) -> Result<Self, FeedError>
    where
        S: FrameSource + 'static,
    {
        let mut topics = topics.to_vec();
        topics.sort();
        topics.dedup();
        source.subscribe(&topics)?;

        let senders = topics
            .iter()
            .map(|topic| (*topic, broadcast::channel(capacity.max(1)).0))
            .collect();
        let outputs = Arc::new(Mutex::new(Outputs {
            senders: Some(senders),
            failure: None,
        }));
        let cancel = CancellationToken::new();

        let thread = {
            let outputs = outputs.clone();
            let cancel = cancel.clone();
            std::thread::Builder::new()
                .name("chainrpc-demux".to_string())
                .spawn(move || receive_loop(source, outputs, cancel))?
        };

        info!("Push feed started for topics {:?}", topics);
        Ok(Self {
            topics,
            outputs,
            cancel,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Like [`TopicDemux::new`], retaining `config.topic_capacity` messages per topic
    pub fn from_config<S>(
        source: S,
        topics: &[Topic],
        config: &NotifyConfig,
    ) -> Result<Self, FeedError>
    where
        S: FrameSource + 'static,
    {
        Self::new(source, topics, config.topic_capacity)
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Stream of messages for `topic`. Fails for a topic the source was not
    /// subscribed to. After the source ended the stream is already complete,
    /// or yields the failure that ended it.
    pub fn subscribe(&self, topic: Topic) -> Result<TopicStream, FeedError> {
        if !self.topics.contains(&topic) {
            return Err(FeedError::NotSubscribed(topic));
        }

        let outputs = lock(&self.outputs);
        let receiver = outputs
            .senders
            .as_ref()
            .and_then(|senders| senders.get(&topic))
            .map(|sender| sender.subscribe());
        let pending = match receiver {
            Some(_) => None,
            None => outputs.failure.clone(),
        };

        Ok(TopicStream {
            topic,
            receiver,
            pending,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the receive thread and wait for it to release the source.
    /// Blocks for at most one receive timeout. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Push feed thread panicked");
            }
            debug!("Push feed thread joined");
        }
    }
}

impl Drop for TopicDemux {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock(outputs: &Mutex<Outputs>) -> std::sync::MutexGuard<'_, Outputs> {
    match outputs.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn receive_loop<S: FrameSource>(
    mut source: S,
    outputs: Arc<Mutex<Outputs>>,
    cancel: CancellationToken,
) {
    let failure = loop {
        if cancel.is_cancelled() {
            debug!("Push feed cancelled");
            break None;
        }

        match source.recv(RECV_POLL_INTERVAL) {
            Ok(Received::Frame(parts)) => match decode_message(&parts) {
                Ok(message) => route(&outputs, message),
                Err(e) => warn!("Dropping frame: {}", e),
            },
            Ok(Received::Idle) => {}
            Ok(Received::End) => {
                info!("Push feed ended");
                break None;
            }
            Err(e) => {
                error!("Push feed failed: {}", e);
                break Some(e);
            }
        }
    };

    let mut outputs = lock(&outputs);
    if let Some(senders) = outputs.senders.take() {
        if let Some(ref e) = failure {
            for sender in senders.values() {
                let _ = sender.send(Err(e.clone()));
            }
        }
    }
    outputs.failure = failure;
    drop(outputs);
    drop(source);
}

fn route(outputs: &Mutex<Outputs>, message: TopicMessage) {
    let outputs = lock(outputs);
    let Some(sender) = outputs
        .senders
        .as_ref()
        .and_then(|senders| senders.get(&message.topic))
    else {
        debug!("Dropping message for unsubscribed topic {}", message.topic);
        return;
    };

    // No receivers is fine; nobody is listening to this topic yet.
    let _ = sender.send(Ok(message));
}

/// Messages of one topic, in publication order
pub struct TopicStream {
    topic: Topic,
    receiver: Option<broadcast::Receiver<Result<TopicMessage, FeedError>>>,
    pending: Option<FeedError>,
}

impl TopicStream {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Next message, the error that ended the feed, or `None` once complete.
    pub async fn recv(&mut self) -> Option<Result<TopicMessage, FeedError>> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }

        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(Ok(message)) => return Some(Ok(message)),
                Ok(Err(e)) => {
                    self.receiver = None;
                    return Some(Err(e));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "{} reader fell behind, skipped {} message(s)",
                        self.topic, skipped
                    );
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }
}
