//! oracle-sidecar: sidecar price oracle
//!
//! This library provides the core components for:
//! - Market maps: which pairs exist and which sources price them
//! - Provider workers polling REST APIs or streaming over WebSockets
//! - Orchestration of worker run state against a changing market map
//! - Market map synchronization with failover and union fetchers
//! - Median, VWAP and TVWAP aggregation under a staleness bound
//! - A supervisor with cooperative shutdown and panic isolation
//! - Full observability stack

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod marketmap;
pub mod oracle;
pub mod orchestrator;
pub mod provider;
pub mod service;
pub mod task;
pub mod telemetry;
pub mod types;
pub mod ws;
