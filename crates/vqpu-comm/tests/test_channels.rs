//! Channel and discovery behavior across real sockets and files.

use std::sync::Arc;
use std::time::Duration;

use vqpu_comm::{
    ClassicalChannel, CommError, DiscoveryStore, Endpoint, FileDiscovery, RankFabric,
    RouterChannel, RouterOptions, WaitPolicy, wait_for, wait_for_prefix,
};

fn fast_poll() -> WaitPolicy {
    WaitPolicy {
        interval: Duration::from_millis(5),
        max_attempts: Some(400),
    }
}

// ---------------------------------------------------------------------------
// Router transport
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn router_keeps_per_sender_order_under_interleaving() {
    let d = RouterChannel::bind(RouterOptions::default()).await.unwrap();
    let senders = [
        Arc::new(RouterChannel::bind(RouterOptions::default()).await.unwrap()),
        Arc::new(RouterChannel::bind(RouterOptions::default()).await.unwrap()),
        Arc::new(RouterChannel::bind(RouterOptions::default()).await.unwrap()),
    ];
    let target = d.endpoint().clone();

    let mut handles = Vec::new();
    for (who, sender) in senders.iter().enumerate() {
        let sender = Arc::clone(sender);
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            for seq in 0..50u32 {
                let payload = format!("{who}:{seq}");
                sender.send_info(&payload, &target).await.unwrap();
                if seq % 7 == who as u32 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Drain the middle sender first so the others' traffic has to be parked.
    for who in [1usize, 2, 0] {
        let peer = senders[who].endpoint().clone();
        for seq in 0..50u32 {
            let got = d.recv_info(&peer).await.unwrap();
            assert_eq!(got, format!("{who}:{seq}"));
        }
    }
}

#[tokio::test]
async fn router_send_connects_on_first_use() {
    let a = RouterChannel::bind(RouterOptions::default()).await.unwrap();
    let b = RouterChannel::bind(RouterOptions::default()).await.unwrap();

    assert!(!a.is_connected(b.endpoint()).await);
    a.send_info("{\"counts\":{}}", b.endpoint()).await.unwrap();
    assert!(a.is_connected(b.endpoint()).await);
    assert_eq!(b.recv_info(a.endpoint()).await.unwrap(), "{\"counts\":{}}");
}

#[tokio::test]
async fn router_rejects_oversized_frames() {
    let a = RouterChannel::bind(RouterOptions {
        max_frame: 8,
        ..RouterOptions::default()
    })
    .await
    .unwrap();
    let b = RouterChannel::bind(RouterOptions::default()).await.unwrap();

    let err = a.send(&[0u8; 9], b.endpoint()).await.unwrap_err();
    assert!(matches!(err, CommError::FrameTooLarge { len: 9, max: 8 }));
}

#[tokio::test]
async fn router_bidirectional_exchange() {
    let a = RouterChannel::bind(RouterOptions::default()).await.unwrap();
    let b = RouterChannel::bind(RouterOptions::default()).await.unwrap();

    a.send_measure(true, b.endpoint()).await.unwrap();
    b.send_measure(false, a.endpoint()).await.unwrap();
    assert!(b.recv_measure(a.endpoint()).await.unwrap());
    assert!(!a.recv_measure(b.endpoint()).await.unwrap());
}

// ---------------------------------------------------------------------------
// Rank transport
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ranks_attribute_messages_to_their_sender() {
    let channels: Vec<_> = RankFabric::create(4).into_iter().map(Arc::new).collect();
    let d = Arc::clone(&channels[3]);

    for (seq, who) in [0usize, 2, 1, 0, 2, 1, 1].into_iter().enumerate() {
        channels[who]
            .send_info(&format!("{who}:{seq}"), d.endpoint())
            .await
            .unwrap();
    }

    assert_eq!(d.recv_info(&Endpoint::from_rank(1)).await.unwrap(), "1:2");
    assert_eq!(d.recv_info(&Endpoint::from_rank(1)).await.unwrap(), "1:5");
    assert_eq!(d.recv_info(&Endpoint::from_rank(0)).await.unwrap(), "0:0");
    assert_eq!(d.recv_info(&Endpoint::from_rank(2)).await.unwrap(), "2:1");
    assert_eq!(d.recv_info(&Endpoint::from_rank(1)).await.unwrap(), "1:6");
    assert_eq!(d.recv_info(&Endpoint::from_rank(0)).await.unwrap(), "0:3");
}

#[tokio::test]
async fn measure_payload_must_be_four_bytes() {
    let channels = RankFabric::create(2);
    channels[0]
        .send(b"xy", channels[1].endpoint())
        .await
        .unwrap();
    let err = channels[1]
        .recv_measure(channels[0].endpoint())
        .await
        .unwrap_err();
    assert!(matches!(err, CommError::Decode { .. }));
}

// ---------------------------------------------------------------------------
// File discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_discovery_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileDiscovery::new(dir.path().join("nested").join("communications.json"));

    store.publish("job_0", &Endpoint::tcp("10.0.0.5", 6001)).await.unwrap();
    store.publish("job_executor", &Endpoint::tcp("10.0.0.6", 6002)).await.unwrap();

    let record = store.lookup("job_0").await.unwrap().unwrap();
    assert_eq!(record.communications_endpoint.as_str(), "tcp://10.0.0.5:6001");
    assert!(store.lookup("job_1").await.unwrap().is_none());

    let content = std::fs::read_to_string(store.path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(
        doc["job_executor"]["communications_endpoint"],
        "tcp://10.0.0.6:6002"
    );

    store.remove("job_0").await.unwrap();
    assert!(store.lookup("job_0").await.unwrap().is_none());
    assert!(!dir.path().join("nested").join("communications.json.lock").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_discovery_concurrent_publishers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("communications.json");

    let mut handles = Vec::new();
    for id in 0..8u16 {
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            let store = FileDiscovery::new(path);
            store
                .publish(&format!("job_{id}"), &Endpoint::tcp("127.0.0.1", 7000 + id))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let store = FileDiscovery::new(&path);
    let entries = wait_for_prefix(&store, "job_", 8, fast_poll()).await.unwrap();
    assert_eq!(entries.len(), 8);
}

#[tokio::test]
async fn channel_publish_then_peer_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileDiscovery::new(dir.path().join("communications.json"));
    let a = RouterChannel::bind(RouterOptions::default()).await.unwrap();
    let b = RouterChannel::bind(RouterOptions::default()).await.unwrap();

    a.publish(&store, "job_0").await.unwrap();
    let record = wait_for(&store, "job_0", fast_poll()).await.unwrap();
    assert_eq!(&record.communications_endpoint, a.endpoint());

    b.connect(&record.communications_endpoint).await.unwrap();
    b.send_measure(true, &record.communications_endpoint).await.unwrap();
    assert!(a.recv_measure(b.endpoint()).await.unwrap());
}
