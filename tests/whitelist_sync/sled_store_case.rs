use kv_whitelist::SledKv;
use kv_whitelist::Whitelist;
use kv_whitelist::WhitelistConfig;
use tempfile::TempDir;

use crate::commons::add_many;
use crate::commons::eventually;
use crate::commons::stored_state;
use crate::commons::NETWORK_KEY;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sled_backed_caches_converge() {
    let store = SledKv::temporary().unwrap();
    let config = WhitelistConfig::default();
    let a = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();
    let b = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();

    a.enable().await.unwrap();
    a.add("alice").await.unwrap();

    assert!(eventually(|| b.is_enabled() && b.contains("alice")).await);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replacement_cache_reloads_persisted_state() {
    let dir = TempDir::new().unwrap();
    let store = SledKv::open(dir.path().join("whitelist")).unwrap();
    let config = WhitelistConfig {
        reload_on_start: true,
        ..Default::default()
    };

    let previous = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();
    previous.enable().await.unwrap();
    previous.add("alice").await.unwrap();
    previous.shutdown().await.unwrap();
    drop(previous);

    let whitelist = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();

    assert!(whitelist.is_enabled());
    assert_eq!(whitelist.all_whitelisted(), vec!["alice"]);
    whitelist.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sled_concurrent_writers_converge_to_store() {
    let store = SledKv::temporary().unwrap();
    let config = WhitelistConfig::default();
    let namespace = config.namespace_for(NETWORK_KEY);
    let a = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();
    let b = Whitelist::for_network(&store, NETWORK_KEY, &config).await.unwrap();

    let writes = async {
        tokio::join!(add_many(&a, "a", 25), add_many(&b, "b", 25));
    };
    tokio::time::timeout(std::time::Duration::from_secs(30), writes)
        .await
        .expect("concurrent writes did not finish");

    assert!(eventually(|| a.snapshot() == b.snapshot()).await);
    assert_eq!(a.snapshot(), stored_state(&store, &namespace).await);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}
