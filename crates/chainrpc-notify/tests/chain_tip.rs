//! Chain tip service against a node served by the dispatcher

use chainrpc_client::{LocalTransport, RpcClient, UnixSocketTransport};
use chainrpc_core::models::{BlockHash, ChainTip, ChainTipStatus, Topic, TopicMessage};
use chainrpc_notify::push::encode_message;
use chainrpc_notify::{
    ChainTipService, ChannelFrameSource, FeedError, PollConfig, TipStreamError, TipSubscription,
    TopicDemux,
};
use chainrpc_server::{Dispatcher, HandlerError, IpcServer, MethodRegistry};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

/// A node whose chain can be moved from the test
#[derive(Clone, Default)]
struct FakeNode {
    tips: Arc<Mutex<Vec<ChainTip>>>,
}

impl FakeNode {
    fn set_active(&self, height: u64, byte: u8) -> ChainTip {
        let active = ChainTip::active(height, BlockHash::from_bytes([byte; 32]));
        let fork = ChainTip {
            height: height.saturating_sub(1),
            hash: BlockHash::from_bytes([!byte; 32]),
            branchlen: 1,
            status: ChainTipStatus::ValidFork,
        };
        *self.tips.lock().unwrap() = vec![fork, active.clone()];
        active
    }

    fn dispatcher(&self) -> Arc<Dispatcher> {
        let mut registry = MethodRegistry::new();
        let tips = self.tips.clone();
        registry.register("getchaintips", move |(): ()| {
            let tips = tips.lock().unwrap().clone();
            async move { Ok::<_, HandlerError>(tips) }
        });
        Arc::new(Dispatcher::new(registry))
    }
}

async fn next_tip(sub: &mut TipSubscription) -> ChainTip {
    timeout(Duration::from_secs(5), sub.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}

fn block_message(byte: u8, sequence: u64) -> Vec<Vec<u8>> {
    let message = TopicMessage::new(Topic::HashBlock, vec![byte; 32], sequence);
    encode_message(&message)
}

#[tokio::test]
async fn test_push_queries_on_each_block() {
    let node = FakeNode::default();
    let first = node.set_active(800_000, 0x01);
    let client = RpcClient::new(LocalTransport::new(node.dispatcher()));

    let (source, feed) = ChannelFrameSource::new();
    let demux = TopicDemux::new(source, &[Topic::HashBlock, Topic::HashTx], 8).unwrap();
    let service = ChainTipService::push(demux, client);
    let mut sub = service.subscribe().unwrap();

    assert_eq!(next_tip(&mut sub).await, first);

    // A block notification that does not move the tip emits nothing
    feed.send_frame(block_message(0x01, 0)).unwrap();
    let second = node.set_active(800_001, 0x02);
    feed.send_frame(block_message(0x02, 1)).unwrap();
    assert_eq!(next_tip(&mut sub).await, second);

    // Reorg back to the first block
    let reorg = node.set_active(800_000, 0x01);
    feed.send_frame(block_message(0x01, 2)).unwrap();
    assert_eq!(next_tip(&mut sub).await, reorg);

    service.close().await;
    assert!(sub.recv().await.is_none());
    assert!(matches!(service.subscribe(), Err(TipStreamError::Closed)));
}

#[tokio::test]
async fn test_push_feed_failure_reaches_subscribers() {
    let node = FakeNode::default();
    let first = node.set_active(1, 0x11);
    let client = RpcClient::new(LocalTransport::new(node.dispatcher()));

    let (source, feed) = ChannelFrameSource::new();
    let demux = TopicDemux::new(source, &[Topic::HashBlock], 8).unwrap();
    let service = ChainTipService::push(demux, client);
    let mut sub = service.subscribe().unwrap();
    assert_eq!(sub.recv().await.unwrap().unwrap(), first);

    feed.fail(FeedError::Source("publisher reset".to_string()))
        .unwrap();
    let err = timeout(Duration::from_secs(5), sub.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, TipStreamError::Feed(_)));
    assert!(sub.recv().await.is_none());

    service.close().await;
}

#[tokio::test]
async fn test_push_with_rawblock_trigger() {
    let node = FakeNode::default();
    node.set_active(5, 0x05);
    let client = RpcClient::new(LocalTransport::new(node.dispatcher()));

    let (source, feed) = ChannelFrameSource::new();
    let demux = TopicDemux::new(source, &[Topic::RawBlock], 8).unwrap();
    let service = ChainTipService::push(demux, client).with_trigger(Topic::RawBlock);
    let mut sub = service.subscribe().unwrap();
    assert_eq!(sub.recv().await.unwrap().unwrap().height, 5);

    let next = node.set_active(6, 0x06);
    let raw = TopicMessage::new(Topic::RawBlock, b"serialized block".to_vec(), 0);
    feed.send_frame(encode_message(&raw)).unwrap();
    assert_eq!(next_tip(&mut sub).await, next);

    service.close().await;
}

#[tokio::test]
async fn test_polling_over_unix_socket() {
    let node = FakeNode::default();
    let first = node.set_active(10, 0x0a);

    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("node.sock");
    let server = Arc::new(IpcServer::new(&socket_path, node.dispatcher()));
    let listener = server.bind().unwrap();
    tokio::spawn(server.serve(listener));

    let client = RpcClient::new(UnixSocketTransport::new(&socket_path));
    let config = PollConfig {
        initial_delay: Duration::from_millis(10),
        interval: Duration::from_millis(50),
    };
    let service = ChainTipService::polling(client, config);
    let mut sub = service.subscribe().unwrap();

    assert_eq!(next_tip(&mut sub).await, first);

    let second = node.set_active(11, 0x0b);
    assert_eq!(next_tip(&mut sub).await, second);
    assert_eq!(service.latest(), Some(second.clone()));

    let mut late = service.subscribe().unwrap();
    assert_eq!(late.recv().await.unwrap().unwrap(), second);

    service.close().await;
}
