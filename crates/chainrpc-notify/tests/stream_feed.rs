//! Push feed relayed over a Unix socket

use chainrpc_core::models::{Topic, TopicMessage};
use chainrpc_notify::push::{encode_frame, encode_message};
use chainrpc_notify::{FeedError, StreamFrameSource, TopicDemux};
use std::io::Write;
use std::os::unix::net::UnixListener;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

#[tokio::test]
async fn test_relay_to_demux() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("feed.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();

    let publisher = std::thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        go_rx.recv().unwrap();
        for (i, topic) in [Topic::HashTx, Topic::HashBlock, Topic::HashTx].iter().enumerate() {
            let message = TopicMessage::new(*topic, vec![i as u8; 32], i as u64);
            let frame = encode_frame(&encode_message(&message)).unwrap();
            conn.write_all(&frame).unwrap();
        }
    });

    let source = StreamFrameSource::connect_unix(&socket_path).unwrap();
    let demux = TopicDemux::new(source, &[Topic::HashBlock, Topic::HashTx], 16).unwrap();
    let mut blocks = demux.subscribe(Topic::HashBlock).unwrap();
    let mut txs = demux.subscribe(Topic::HashTx).unwrap();
    go_tx.send(()).unwrap();
    publisher.join().unwrap();

    let wait = Duration::from_secs(5);
    let block = timeout(wait, blocks.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(block.sequence, 1);
    assert!(timeout(wait, blocks.recv()).await.unwrap().is_none());

    let sequences: Vec<u64> = [
        timeout(wait, txs.recv()).await.unwrap(),
        timeout(wait, txs.recv()).await.unwrap(),
    ]
    .into_iter()
    .map(|item| item.unwrap().unwrap().sequence)
    .collect();
    assert_eq!(sequences, vec![0, 2]);
    assert!(timeout(wait, txs.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_publisher() {
    let temp_dir = TempDir::new().unwrap();
    let result = StreamFrameSource::connect_unix(temp_dir.path().join("absent.sock"));
    assert!(matches!(result, Err(FeedError::Io(_))));
}
