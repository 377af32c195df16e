//! End-to-end integration tests

use crate::common::{endpoints, eventually, market_map, pair, ScriptedFactory};
use oracle_sidecar::config::Config;
use oracle_sidecar::oracle::{Oracle, OracleError};
use oracle_sidecar::service::OracleService;
use oracle_sidecar::task::Shutdown;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn write_market_map(dir: &TempDir, json: &str) -> std::path::PathBuf {
    let path = dir.path().join("market_map.json");
    std::fs::write(&path, json).unwrap();
    path
}

#[tokio::test]
async fn test_two_sources_median_then_stale() {
    let dir = TempDir::new().unwrap();
    let path = write_market_map(&dir, &market_map(&["BTC"], &["a", "b"]).to_pretty_json().unwrap());

    let mut config = Config::default();
    config.oracle.update_interval_ms = 20;
    config.oracle.max_price_age_ms = 400;
    config.market_map.initial_path = Some(path);
    config.providers = endpoints(&["a", "b"]);

    let factory = Arc::new(ScriptedFactory::new(&[("a", dec!(100)), ("b", dec!(200))]));
    let oracle = Arc::new(Oracle::with_factory(&config, factory).unwrap());
    let service = OracleService::new(&oracle);

    let parent = Shutdown::new();
    let runner = oracle.clone();
    let signal = parent.subscribe();
    let handle = tokio::spawn(async move { runner.start(signal).await });

    let service = &service;
    let priced = eventually(Duration::from_secs(2), || async move {
        service.prices().await.prices.get("BTC/USD").map(String::as_str) == Some("150")
    })
    .await;
    assert!(priced, "median of 100 and 200 never published");

    // Scripted sources publish once; after the max age the pair disappears
    let reader = &oracle;
    let expired = eventually(Duration::from_secs(2), || async move {
        reader.prices().await.get(&pair("BTC")).is_none()
    })
    .await;
    assert!(expired, "stale prices were still aggregated");

    oracle.stop().await;
    assert!(handle.await.unwrap().is_ok());
}

/// Serves a Coinbase-style spot response for every request
async fn spot_server(amount: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = format!(r#"{{"data":{{"amount":"{amount}","base":"BTC","currency":"USD"}}}}"#);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_rest_provider_full_stack() {
    let url = spot_server("42500.5").await;
    let dir = TempDir::new().unwrap();
    let path = write_market_map(
        &dir,
        &market_map(&["BTC"], &["coinbase_api"]).to_pretty_json().unwrap(),
    );

    let toml = format!(
        r#"
        [oracle]
        update_interval_ms = 20

        [market_map]
        initial_path = "{}"

        [[providers]]
        name = "coinbase_api"
        kind = "api"
        url = "{}"
        interval_ms = 50
        timeout_ms = 1000
        "#,
        path.display(),
        url
    );
    let config = Config::parse(&toml).unwrap();
    let oracle = Arc::new(Oracle::from_config(&config).unwrap());
    let service = OracleService::new(&oracle);

    let parent = Shutdown::new();
    let runner = oracle.clone();
    let signal = parent.subscribe();
    let handle = tokio::spawn(async move { runner.start(signal).await });

    let service = &service;
    let priced = eventually(Duration::from_secs(5), || async move {
        service.prices().await.prices.get("BTC/USD").map(String::as_str) == Some("42500.5")
    })
    .await;
    assert!(priced, "REST price never reached the query surface");

    parent.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("oracle must stop after parent cancellation")
        .unwrap();
    assert!(matches!(result, Err(OracleError::Cancelled)));
}
