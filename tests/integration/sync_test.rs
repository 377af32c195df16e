//! Market map synchronization against a live oracle

use crate::common::{endpoints, eventually, market_map, pair, ScriptedFactory};
use oracle_sidecar::config::Config;
use oracle_sidecar::marketmap::MarketMap;
use oracle_sidecar::oracle::Oracle;
use oracle_sidecar::provider::Provider;
use oracle_sidecar::task::Shutdown;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_oracle_follows_fetched_market_map() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("upstream.json");
    let persisted = dir.path().join("applied.json");
    std::fs::write(&source, market_map(&["BTC"], &["a", "b"]).to_pretty_json().unwrap()).unwrap();

    let mut config = Config::default();
    config.oracle.update_interval_ms = 20;
    config.market_map.fetch_url = Some(format!("file://{}", source.display()));
    config.market_map.update_interval_ms = 30;
    config.market_map.persist_path = Some(persisted.clone());
    config.providers = endpoints(&["a", "b"]);

    let factory = Arc::new(ScriptedFactory::new(&[("a", dec!(100)), ("b", dec!(200))]));
    let oracle = Arc::new(Oracle::with_factory(&config, factory.clone()).unwrap());
    assert!(oracle.market_map().await.is_empty());

    let parent = Shutdown::new();
    let runner = oracle.clone();
    let signal = parent.subscribe();
    let handle = tokio::spawn(async move { runner.start(signal).await });

    let reader = &oracle;
    let priced = eventually(Duration::from_secs(3), || async move {
        reader.prices().await.get(&pair("BTC")) == Some(dec!(150))
    })
    .await;
    assert!(priced, "fetched market map never drove prices");

    // Upstream drops BTC and source b
    let next = market_map(&["ETH"], &["a"]);
    std::fs::write(&source, next.to_pretty_json().unwrap()).unwrap();

    let switched = eventually(Duration::from_secs(3), || async move {
        let prices = reader.prices().await;
        prices.get(&pair("ETH")) == Some(dec!(100)) && prices.get(&pair("BTC")).is_none()
    })
    .await;
    assert!(switched, "updated market map never applied");

    let b = &factory.provider("b");
    assert!(eventually(Duration::from_secs(2), || async move { !b.is_running() }).await);
    assert!(oracle.orchestrator().last_sync().await.is_some());
    assert_eq!(MarketMap::load(&persisted).unwrap(), next);

    oracle.stop().await;
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_invalid_upstream_keeps_previous_map() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("upstream.json");
    std::fs::write(&source, market_map(&["BTC"], &["a"]).to_pretty_json().unwrap()).unwrap();

    let mut config = Config::default();
    config.oracle.update_interval_ms = 20;
    config.market_map.fetch_url = Some(format!("file://{}", source.display()));
    config.market_map.update_interval_ms = 30;
    config.providers = endpoints(&["a"]);

    let factory = Arc::new(ScriptedFactory::new(&[("a", dec!(100))]));
    let oracle = Arc::new(Oracle::with_factory(&config, factory).unwrap());

    let parent = Shutdown::new();
    let runner = oracle.clone();
    let signal = parent.subscribe();
    let handle = tokio::spawn(async move { runner.start(signal).await });

    let reader = &oracle;
    assert!(
        eventually(Duration::from_secs(3), || async move {
            reader.prices().await.get(&pair("BTC")) == Some(dec!(100))
        })
        .await
    );

    std::fs::write(&source, "{ not json").unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(*oracle.market_map().await, market_map(&["BTC"], &["a"]));
    assert_eq!(oracle.prices().await.get(&pair("BTC")), Some(dec!(100)));

    oracle.stop().await;
    handle.await.unwrap().unwrap();
}
