//! Prometheus exporter for BT Smart Hub statistics.
//!
//! Each request to the metrics endpoint scrapes the router's WAN status
//! document and LAN device script, decodes them with [`smarthub_common`] and
//! renders the result in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Smart Hub    │<────│    Collector    │<────│   HTTP Server   │
//! │ (wan_conn.xml,  │     │ (scrape/render) │     │   (/metrics)    │
//! │  MyDevice.js)   │     └─────────────────┘     └─────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! SMARTHUB_HOST=192.168.1.254 smarthub-exporter-prometheus --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod collector;
pub mod config;
pub mod http;
pub mod mapping;

pub use client::{RouterClient, ScrapeError};
pub use collector::{MetricCollector, ScrapeResult, SharedCollector};
pub use config::ExporterConfig;
pub use http::HttpServer;
