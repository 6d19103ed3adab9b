use kv_whitelist::MemoryKv;
use kv_whitelist::Whitelist;
use kv_whitelist::WhitelistConfig;

use crate::commons::add_many;
use crate::commons::eventually;
use crate::commons::stored_state;
use crate::commons::NETWORK_KEY;

#[tokio::test]
async fn test_peer_mutations_propagate_between_caches() {
    let store = MemoryKv::new();
    let config = WhitelistConfig::default();
    let a = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();
    let b = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();

    a.enable().await.unwrap();
    assert!(eventually(|| b.is_enabled()).await);

    a.add("alice").await.unwrap();
    assert!(eventually(|| b.contains("alice")).await);

    b.remove("alice").await.unwrap();
    assert!(eventually(|| !a.contains("alice")).await);

    b.disable().await.unwrap();
    assert!(eventually(|| !a.is_enabled()).await);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_late_joiner_picks_up_existing_state() {
    let store = MemoryKv::new();
    let config = WhitelistConfig::default();
    let first = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();
    first.enable().await.unwrap();
    first.add("alice").await.unwrap();
    first.add("bob").await.unwrap();

    let late = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();

    assert!(eventually(|| late.snapshot() == first.snapshot()).await);
    assert_eq!(late.all_whitelisted(), vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_networks_do_not_share_whitelists() {
    let store = MemoryKv::new();
    let config = WhitelistConfig::default();
    let lobby = Whitelist::for_network(&store, "lobby", &config).await.unwrap();
    let survival = Whitelist::for_network(&store, "survival", &config).await.unwrap();

    lobby.add("alice").await.unwrap();
    survival.add("bob").await.unwrap();
    // Give any misrouted event time to arrive
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(lobby.all_whitelisted(), vec!["alice"]);
    assert_eq!(survival.all_whitelisted(), vec!["bob"]);
    assert_eq!(store.bucket_count(), 2);
}

#[tokio::test]
async fn test_stopped_cache_no_longer_follows_peers() {
    let store = MemoryKv::new();
    let config = WhitelistConfig::default();
    let a = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();
    let b = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();

    b.shutdown().await.unwrap();
    a.add("alice").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!b.contains("alice"));

    // An explicit reload still catches up
    b.reload().await.unwrap();
    assert!(b.contains("alice"));
}

#[tokio::test]
async fn test_burst_larger_than_watch_buffer_converges() {
    let store = MemoryKv::with_watch_buffer_size(4);
    let config = WhitelistConfig::default();
    let namespace = config.namespace_for(NETWORK_KEY);
    let writer = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();
    let follower = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();

    writer.enable().await.unwrap();
    add_many(&writer, "burst", 40).await;

    assert!(eventually(|| follower.snapshot() == writer.snapshot()).await);
    assert_eq!(follower.snapshot(), stored_state(&store, &namespace).await);
    assert_eq!(follower.all_whitelisted().len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_converge_to_store() {
    let store = MemoryKv::with_watch_buffer_size(4);
    let config = WhitelistConfig::default();
    let namespace = config.namespace_for(NETWORK_KEY);
    let a = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();
    let b = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();

    tokio::join!(add_many(&a, "a", 25), add_many(&b, "b", 25));

    assert!(eventually(|| a.snapshot() == b.snapshot()).await);
    assert_eq!(a.snapshot(), stored_state(&store, &namespace).await);
}
