//! Supervisor lifecycle under a changing market map

use crate::common::{endpoints, eventually, market_map, pair, ScriptedFactory};
use oracle_sidecar::config::Config;
use oracle_sidecar::marketmap::{MarketMap, ProviderConfig};
use oracle_sidecar::oracle::{Oracle, OracleError, OracleState};
use oracle_sidecar::provider::Provider;
use oracle_sidecar::task::Shutdown;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    oracle: Arc<Oracle>,
    factory: Arc<ScriptedFactory>,
    parent: Shutdown,
    handle: tokio::task::JoinHandle<Result<(), OracleError>>,
    _dir: TempDir,
}

async fn start(initial: MarketMap, providers: &[(&str, rust_decimal::Decimal)]) -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market_map.json");
    std::fs::write(&path, initial.to_pretty_json().unwrap()).unwrap();

    let names: Vec<&str> = providers.iter().map(|(n, _)| *n).collect();
    let mut config = Config::default();
    config.oracle.update_interval_ms = 20;
    config.market_map.initial_path = Some(path);
    config.providers = endpoints(&names);

    let factory = Arc::new(ScriptedFactory::new(providers));
    let oracle = Arc::new(Oracle::with_factory(&config, factory.clone()).unwrap());

    let parent = Shutdown::new();
    let runner = oracle.clone();
    let signal = parent.subscribe();
    let handle = tokio::spawn(async move { runner.start(signal).await });

    let probe = &oracle;
    assert!(eventually(Duration::from_secs(2), || async move { probe.is_running() }).await);

    Harness {
        oracle,
        factory,
        parent,
        handle,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_unused_provider_never_runs() {
    let h = start(market_map(&["BTC"], &["a"]), &[("a", dec!(100)), ("b", dec!(200))]).await;

    let a = &h.factory.provider("a");
    assert!(eventually(Duration::from_secs(2), || async move { a.is_running() }).await);
    assert!(!h.factory.provider("b").is_running());
    assert_eq!(h.factory.provider("b").starts.load(Ordering::SeqCst), 0);

    h.oracle.stop().await;
    assert!(h.handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_reconfigure_live_without_restart() {
    let h = start(market_map(&["BTC"], &["a"]), &[("a", dec!(100)), ("b", dec!(300))]).await;
    let a = &h.factory.provider("a");
    assert!(eventually(Duration::from_secs(2), || async move { a.is_running() }).await);

    // BTC gains source b, ETH appears on a
    let mut next = market_map(&["BTC", "ETH"], &["a"]);
    next.markets
        .get_mut("BTC/USD")
        .unwrap()
        .provider_configs
        .push(ProviderConfig::new("b", "BTC-USD"));
    h.oracle.orchestrator().update_market_map(next.clone()).await.unwrap();

    let oracle = &h.oracle;
    let priced = eventually(Duration::from_secs(2), || async move {
        let prices = oracle.prices().await;
        prices.get(&pair("BTC")) == Some(dec!(200)) && prices.get(&pair("ETH")) == Some(dec!(100))
    })
    .await;
    assert!(priced, "reconfigured prices never published");

    assert_eq!(a.starts.load(Ordering::SeqCst), 1);
    assert_eq!(a.get_ids().len(), 2);
    assert_eq!(*h.oracle.market_map().await, next);

    h.oracle.stop().await;
    assert!(h.handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_removed_provider_stops() {
    let h = start(market_map(&["BTC"], &["a", "b"]), &[("a", dec!(100)), ("b", dec!(200))]).await;
    let b = &h.factory.provider("b");
    assert!(eventually(Duration::from_secs(2), || async move { b.is_running() }).await);

    h.oracle
        .orchestrator()
        .update_market_map(market_map(&["BTC"], &["a"]))
        .await
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || async move { !b.is_running() }).await);
    assert!(b.get_ids().is_empty());

    h.oracle.stop().await;
    h.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_parent_cancel_stops_everything_in_time() {
    let h = start(market_map(&["BTC"], &["a", "b"]), &[("a", dec!(100)), ("b", dec!(200))]).await;

    h.parent.trigger();
    let result = tokio::time::timeout(Duration::from_secs(2), h.handle)
        .await
        .expect("shutdown exceeded its bound")
        .unwrap();
    assert!(matches!(result, Err(OracleError::Cancelled)));
    assert_eq!(h.oracle.state(), OracleState::Stopped);
    assert!(!h.factory.provider("a").is_running());
    assert!(!h.factory.provider("b").is_running());

    // stop after the fact is a no-op
    tokio::time::timeout(Duration::from_secs(1), h.oracle.stop())
        .await
        .expect("stop after exit must return");
}

#[tokio::test]
async fn test_stop_without_start() {
    let oracle = Oracle::from_config(&Config::default()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), oracle.stop())
        .await
        .expect("stop on a fresh oracle must return");
    oracle.stop().await;

    let parent = Shutdown::new();
    assert!(matches!(
        oracle.start(parent.subscribe()).await,
        Err(OracleError::AlreadyStarted)
    ));
}
