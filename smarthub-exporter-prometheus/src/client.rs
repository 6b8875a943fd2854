//! HTTP client for the router's status endpoints.
//!
//! Neither endpoint requires authentication; the hub only checks that the
//! `Referer` header points at itself.

use std::time::Duration;

use reqwest::header::REFERER;
use smarthub_common::{
    ConnectionDetails, DecodeError, Device, decode_lan_payload, decode_wan_payload,
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::RouterConfig;

/// WAN connection document.
pub const WAN_PATH: &str = "/nonAuth/wan_conn.xml";

/// LAN device script.
pub const LAN_PATH: &str = "/cgi/cgi_basicMyDevice.js";

/// Errors from a single fetch-and-decode round trip.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Connection refused, timeout, DNS failure, etc.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The router answered with a non-success status.
    #[error("Router returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// The payload could not be decoded.
    #[error("Failed to decode {endpoint} payload: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: DecodeError,
    },
}

/// Client for one router.
#[derive(Debug, Clone)]
pub struct RouterClient {
    http: reqwest::Client,
    base_url: String,
}

impl RouterClient {
    /// Build a client from the router configuration.
    pub fn new(config: &RouterConfig) -> Result<Self, ScrapeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("smarthub-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::from_reqwest(&base_url_for(&config.host), http))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ScrapeError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Fetching router payload");

        let response = self
            .http
            .get(&url)
            .header(REFERER, format!("{}/", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        trace!(url = %url, bytes = body.len(), "Fetched router payload");
        Ok(body.to_vec())
    }

    /// Fetch and decode the WAN connection details.
    pub async fn scrape_wan(&self) -> Result<ConnectionDetails, ScrapeError> {
        let body = self.fetch(WAN_PATH).await?;
        decode_wan_payload(&body).map_err(|source| ScrapeError::Decode {
            endpoint: "WAN",
            source,
        })
    }

    /// Fetch and decode the LAN device list.
    pub async fn scrape_lan(&self) -> Result<Vec<Device>, ScrapeError> {
        let body = self.fetch(LAN_PATH).await?;
        decode_lan_payload(&body).map_err(|source| ScrapeError::Decode {
            endpoint: "LAN",
            source,
        })
    }
}

/// `http://host` unless the host already carries a scheme.
fn base_url_for(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
