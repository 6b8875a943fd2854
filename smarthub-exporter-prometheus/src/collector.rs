//! Scrape collector: fetches router data on demand and renders it in the
//! Prometheus text exposition format.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use smarthub_common::{ConnectionDetails, Device};
use tracing::{debug, trace, warn};

use crate::client::{RouterClient, ScrapeError};
use crate::config::{FilterConfig, PrometheusConfig};
use crate::mapping::{
    DEVICE_METRICS, LAN_UP, MetricDesc, SCRAPE_FAILURES_TOTAL, SCRAPES_TOTAL, UP, WAN_METRICS,
    build_metric_name, device_labels, sanitize_label_name,
};

/// Outcome of one scrape cycle.
#[derive(Debug)]
pub struct ScrapeResult {
    /// WAN connection details.
    pub wan: Result<ConnectionDetails, ScrapeError>,
    /// LAN devices, `None` when LAN scraping is disabled.
    pub lan: Option<Result<Vec<Device>, ScrapeError>>,
}

/// Filter for metrics and devices.
pub struct MetricFilter {
    include_metrics: Vec<glob::Pattern>,
    exclude_metrics: Vec<glob::Pattern>,
    exclude_devices: Vec<glob::Pattern>,
}

fn compile(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect()
}

impl MetricFilter {
    /// Create a new filter from configuration.
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            include_metrics: compile(&config.include_metrics),
            exclude_metrics: compile(&config.exclude_metrics),
            exclude_devices: compile(&config.exclude_devices),
        }
    }

    /// Check a metric name (without prefix) against the include/exclude globs.
    pub fn should_include(&self, metric: &str) -> bool {
        if !self.include_metrics.is_empty() && !self.include_metrics.iter().any(|p| p.matches(metric))
        {
            return false;
        }
        !self.exclude_metrics.iter().any(|p| p.matches(metric))
    }

    /// Check a device against the exclusion globs (hostname or MAC).
    pub fn should_include_device(&self, device: &Device) -> bool {
        !self
            .exclude_devices
            .iter()
            .any(|p| p.matches(&device.hostname) || p.matches(&device.mac))
    }
}

impl Default for MetricFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

/// Collector statistics.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Scrape cycles run.
    pub scrapes: u64,
    /// Successful WAN scrapes.
    pub wan_successes: u64,
    /// Failed WAN scrapes.
    pub wan_failures: u64,
    /// Successful LAN scrapes.
    pub lan_successes: u64,
    /// Failed LAN scrapes.
    pub lan_failures: u64,
}

/// Thread-safe scrape collector for one router.
pub struct MetricCollector {
    client: RouterClient,
    prometheus_config: PrometheusConfig,
    scrape_lan: bool,
    filter: MetricFilter,
    /// Sanitized default labels, sorted by name.
    default_labels: Vec<(String, String)>,
    stats: RwLock<CollectorStats>,
}

impl MetricCollector {
    /// Create a new collector.
    pub fn new(
        client: RouterClient,
        prometheus_config: PrometheusConfig,
        filter_config: &FilterConfig,
        scrape_lan: bool,
    ) -> Self {
        let mut default_labels: Vec<(String, String)> = prometheus_config
            .default_labels
            .iter()
            .map(|(k, v)| (sanitize_label_name(k), v.clone()))
            .collect();
        default_labels.sort();

        Self {
            client,
            prometheus_config,
            scrape_lan,
            filter: MetricFilter::new(filter_config),
            default_labels,
            stats: RwLock::new(CollectorStats::default()),
        }
    }

    /// Run one scrape cycle, fetching WAN and LAN concurrently.
    pub async fn scrape(&self) -> ScrapeResult {
        let started = Instant::now();

        let (wan, lan) = if self.scrape_lan {
            let (wan, lan) = tokio::join!(self.client.scrape_wan(), self.client.scrape_lan());
            (wan, Some(lan))
        } else {
            (self.client.scrape_wan().await, None)
        };

        if let Err(e) = &wan {
            warn!(router = %self.client.base_url(), error = %e, "WAN scrape failed");
        }
        if let Some(Err(e)) = &lan {
            warn!(router = %self.client.base_url(), error = %e, "LAN scrape failed");
        }

        {
            let mut stats = self.stats.write();
            stats.scrapes += 1;
            match &wan {
                Ok(_) => stats.wan_successes += 1,
                Err(_) => stats.wan_failures += 1,
            }
            match &lan {
                Some(Ok(_)) => stats.lan_successes += 1,
                Some(Err(_)) => stats.lan_failures += 1,
                None => {}
            }
        }

        debug!(
            wan_ok = wan.is_ok(),
            devices = lan.as_ref().and_then(|l| l.as_ref().ok()).map(Vec::len),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scrape finished"
        );

        ScrapeResult { wan, lan }
    }

    /// Scrape the router and render the result.
    pub async fn collect(&self) -> String {
        let result = self.scrape().await;
        self.render(&result)
    }

    /// Whether at least one WAN scrape has succeeded.
    pub fn is_ready(&self) -> bool {
        self.stats.read().wan_successes > 0
    }

    /// Get collector statistics.
    pub fn stats(&self) -> CollectorStats {
        self.stats.read().clone()
    }

    /// Render a scrape result in Prometheus exposition format.
    pub fn render(&self, result: &ScrapeResult) -> String {
        let mut output = Vec::with_capacity(2048);
        let base = self.labels(Vec::new());

        self.write_header(&mut output, &UP);
        self.write_sample(&mut output, &UP, &base, u64::from(result.wan.is_ok()));

        if let Some(lan) = &result.lan {
            self.write_header(&mut output, &LAN_UP);
            self.write_sample(&mut output, &LAN_UP, &base, u64::from(lan.is_ok()));
        }

        if let Ok(wan) = &result.wan {
            for metric in WAN_METRICS {
                if !self.filter.should_include(metric.desc.name) {
                    continue;
                }
                self.write_header(&mut output, &metric.desc);
                self.write_sample(&mut output, &metric.desc, &base, (metric.value)(wan));
            }
        }

        if let Some(Ok(devices)) = &result.lan {
            let devices: Vec<(&Device, Vec<(String, String)>)> = devices
                .iter()
                .filter(|device| {
                    let keep = self.filter.should_include_device(device);
                    if !keep {
                        trace!(mac = %device.mac, hostname = %device.hostname, "Device filtered out");
                    }
                    keep
                })
                .map(|device| (device, self.labels(device_labels(device))))
                .collect();

            for metric in DEVICE_METRICS {
                if !self.filter.should_include(metric.desc.name) {
                    continue;
                }
                self.write_header(&mut output, &metric.desc);
                for (device, labels) in &devices {
                    self.write_sample(&mut output, &metric.desc, labels, (metric.value)(device));
                }
            }
        }

        let stats = self.stats.read();
        self.write_header(&mut output, &SCRAPES_TOTAL);
        self.write_sample(&mut output, &SCRAPES_TOTAL, &base, stats.scrapes);

        self.write_header(&mut output, &SCRAPE_FAILURES_TOTAL);
        let wan_labels = self.labels(vec![("endpoint".to_string(), "wan".to_string())]);
        self.write_sample(&mut output, &SCRAPE_FAILURES_TOTAL, &wan_labels, stats.wan_failures);
        if self.scrape_lan {
            let lan_labels = self.labels(vec![("endpoint".to_string(), "lan".to_string())]);
            self.write_sample(&mut output, &SCRAPE_FAILURES_TOTAL, &lan_labels, stats.lan_failures);
        }

        String::from_utf8(output).unwrap_or_default()
    }

    /// Append default labels that don't collide with `labels`, then sort.
    fn labels(&self, mut labels: Vec<(String, String)>) -> Vec<(String, String)> {
        for (k, v) in &self.default_labels {
            if !labels.iter().any(|(lk, _)| lk == k) {
                labels.push((k.clone(), v.clone()));
            }
        }
        labels.sort_by(|a, b| a.0.cmp(&b.0));
        labels
    }

    fn write_header(&self, output: &mut Vec<u8>, desc: &MetricDesc) {
        let name = build_metric_name(&self.prometheus_config.prefix, desc.name);
        writeln!(output, "# HELP {} {}", name, escape_help(desc.help)).ok();
        writeln!(output, "# TYPE {} {}", name, desc.metric_type.as_str()).ok();
    }

    fn write_sample(
        &self,
        output: &mut Vec<u8>,
        desc: &MetricDesc,
        labels: &[(String, String)],
        value: u64,
    ) {
        let name = build_metric_name(&self.prometheus_config.prefix, desc.name);
        writeln!(output, "{}{} {}", name, format_labels(labels), value).ok();
    }
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<MetricCollector>;

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape backslashes and newlines in HELP text.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_collector(
        prometheus_config: PrometheusConfig,
        filter_config: FilterConfig,
        scrape_lan: bool,
    ) -> MetricCollector {
        let client = RouterClient::from_reqwest("http://127.0.0.1:1", reqwest::Client::new());
        MetricCollector::new(client, prometheus_config, &filter_config, scrape_lan)
    }

    fn wan() -> ConnectionDetails {
        ConnectionDetails {
            is_connected: true,
            uptime_seconds: 1159340,
            downloaded_bytes: 336463954090,
            uploaded_bytes: 34683717318,
            download_rate_bps: 1000000000,
            upload_rate_bps: 1000000000,
        }
    }

    fn device(mac: &str, hostname: &str) -> Device {
        Device {
            mac: mac.to_string(),
            hostname: hostname.to_string(),
            ip: "192.168.1.10".to_string(),
            downloaded_bytes: 20,
            uploaded_bytes: 10,
        }
    }

    fn failure() -> ScrapeError {
        ScrapeError::Status {
            status: 500,
            url: "http://hub/nonAuth/wan_conn.xml".to_string(),
        }
    }

    #[test]
    fn test_render_successful_scrape() {
        let collector =
            make_collector(PrometheusConfig::default(), FilterConfig::default(), true);
        let output = collector.render(&ScrapeResult {
            wan: Ok(wan()),
            lan: Some(Ok(vec![device("AA:BB:CC:DD:EE:FF", "nas")])),
        });

        assert!(output.contains("# TYPE smarthub_up gauge\nsmarthub_up 1\n"));
        assert!(output.contains("smarthub_lan_up 1\n"));
        assert!(output.contains("smarthub_connected 1\n"));
        assert!(output.contains("smarthub_uptime_seconds 1159340\n"));
        assert!(output.contains("# TYPE smarthub_downloaded_bytes counter\n"));
        assert!(output.contains("smarthub_downloaded_bytes 336463954090\n"));
        assert!(output.contains("smarthub_uploaded_bytes 34683717318\n"));
        assert!(output.contains("smarthub_download_rate 1000000000\n"));
        assert!(output.contains("# TYPE smarthub_upload_rate gauge\n"));
        assert!(output.contains(
            "smarthub_device_downloaded_bytes{hostname=\"nas\",ip=\"192.168.1.10\",mac=\"AA:BB:CC:DD:EE:FF\"} 20\n"
        ));
        assert!(output.contains(
            "smarthub_device_uploaded_bytes{hostname=\"nas\",ip=\"192.168.1.10\",mac=\"AA:BB:CC:DD:EE:FF\"} 10\n"
        ));
        assert!(output.contains("# HELP smarthub_connected "));
        assert!(output.contains("smarthub_exporter_scrape_failures_total{endpoint=\"lan\"} 0\n"));
    }

    #[test]
    fn test_render_wan_failure() {
        let collector =
            make_collector(PrometheusConfig::default(), FilterConfig::default(), true);
        let output = collector.render(&ScrapeResult {
            wan: Err(failure()),
            lan: Some(Ok(vec![])),
        });

        assert!(output.contains("smarthub_up 0\n"));
        assert!(output.contains("smarthub_lan_up 1\n"));
        assert!(!output.contains("smarthub_connected"));
        assert!(!output.contains("smarthub_downloaded_bytes"));
    }

    #[test]
    fn test_render_lan_disabled() {
        let collector =
            make_collector(PrometheusConfig::default(), FilterConfig::default(), false);
        let output = collector.render(&ScrapeResult {
            wan: Ok(wan()),
            lan: None,
        });

        assert!(!output.contains("smarthub_lan_up"));
        assert!(!output.contains("smarthub_device_"));
        assert!(!output.contains("endpoint=\"lan\""));
        assert!(output.contains("smarthub_exporter_scrape_failures_total{endpoint=\"wan\"} 0\n"));
    }

    #[test]
    fn test_render_lan_failure_keeps_wan() {
        let collector =
            make_collector(PrometheusConfig::default(), FilterConfig::default(), true);
        let output = collector.render(&ScrapeResult {
            wan: Ok(wan()),
            lan: Some(Err(failure())),
        });

        assert!(output.contains("smarthub_up 1\n"));
        assert!(output.contains("smarthub_lan_up 0\n"));
        assert!(!output.contains("smarthub_device_"));
    }

    #[test]
    fn test_default_labels_and_prefix() {
        let mut config = PrometheusConfig {
            prefix: "bthub".to_string(),
            ..Default::default()
        };
        config
            .default_labels
            .insert("site".to_string(), "home".to_string());
        config
            .default_labels
            .insert("mac".to_string(), "ignored".to_string());

        let collector = make_collector(config, FilterConfig::default(), true);
        let output = collector.render(&ScrapeResult {
            wan: Ok(wan()),
            lan: Some(Ok(vec![device("00:11:22:33:44:55", "tv")])),
        });

        assert!(output.contains("bthub_up{mac=\"ignored\",site=\"home\"} 1\n"));
        assert!(output.contains(
            "bthub_device_uploaded_bytes{hostname=\"tv\",ip=\"192.168.1.10\",mac=\"00:11:22:33:44:55\",site=\"home\"} 10\n"
        ));
        assert!(!output.contains("smarthub_"));
    }

    #[test]
    fn test_label_value_escaping() {
        let collector =
            make_collector(PrometheusConfig::default(), FilterConfig::default(), true);
        let output = collector.render(&ScrapeResult {
            wan: Ok(wan()),
            lan: Some(Ok(vec![device("00:11:22:33:44:55", "Bob's \"TV\"\\\n")])),
        });

        assert!(output.contains("hostname=\"Bob's \\\"TV\\\"\\\\\\n\""));
    }

    #[test]
    fn test_metric_filters() {
        let filters = FilterConfig {
            include_metrics: vec![],
            exclude_metrics: vec!["*_rate".to_string()],
            exclude_devices: vec!["printer*".to_string(), "00:11:22:33:44:55".to_string()],
        };
        let collector = make_collector(PrometheusConfig::default(), filters, true);
        let output = collector.render(&ScrapeResult {
            wan: Ok(wan()),
            lan: Some(Ok(vec![
                device("00:11:22:33:44:55", "tv"),
                device("AA:AA:AA:AA:AA:AA", "printer-office"),
                device("BB:BB:BB:BB:BB:BB", "laptop"),
            ])),
        });

        assert!(!output.contains("smarthub_download_rate"));
        assert!(!output.contains("smarthub_upload_rate"));
        assert!(output.contains("smarthub_connected 1\n"));
        assert!(output.contains("hostname=\"laptop\""));
        assert!(!output.contains("hostname=\"tv\""));
        assert!(!output.contains("printer-office"));
    }

    #[test]
    fn test_include_filter() {
        let filter = MetricFilter::new(&FilterConfig {
            include_metrics: vec!["device_*".to_string()],
            ..Default::default()
        });

        assert!(filter.should_include("device_uploaded_bytes"));
        assert!(!filter.should_include("connected"));
        assert!(MetricFilter::default().should_include("connected"));
    }

    #[tokio::test]
    async fn test_failed_scrape_updates_stats() {
        let collector =
            make_collector(PrometheusConfig::default(), FilterConfig::default(), true);
        assert!(!collector.is_ready());

        let output = collector.collect().await;

        let stats = collector.stats();
        assert_eq!(stats.scrapes, 1);
        assert_eq!(stats.wan_failures, 1);
        assert_eq!(stats.lan_failures, 1);
        assert!(!collector.is_ready());
        assert!(output.contains("smarthub_up 0\n"));
        assert!(output.contains("smarthub_exporter_scrapes_total 1\n"));
        assert!(output.contains("smarthub_exporter_scrape_failures_total{endpoint=\"wan\"} 1\n"));
    }
}
