//! Metric descriptors and the mapping from decoded router data to them.
//!
//! The descriptor tables are plain constants handed to the collector; there
//! is no global registry.

use smarthub_common::{ConnectionDetails, Device};

/// Prometheus metric type, as written on the `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrometheusType {
    Counter,
    Gauge,
}

impl PrometheusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrometheusType::Counter => "counter",
            PrometheusType::Gauge => "gauge",
        }
    }
}

/// Name (without prefix), help text and type of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub metric_type: PrometheusType,
}

/// A WAN metric and how to read it from [`ConnectionDetails`].
#[derive(Debug, Clone, Copy)]
pub struct WanMetric {
    pub desc: MetricDesc,
    pub value: fn(&ConnectionDetails) -> u64,
}

/// A per-device metric and how to read it from a [`Device`].
#[derive(Debug, Clone, Copy)]
pub struct DeviceMetric {
    pub desc: MetricDesc,
    pub value: fn(&Device) -> u64,
}

pub const UP: MetricDesc = MetricDesc {
    name: "up",
    help: "Whether the WAN status endpoint could be scraped and decoded",
    metric_type: PrometheusType::Gauge,
};

pub const LAN_UP: MetricDesc = MetricDesc {
    name: "lan_up",
    help: "Whether the LAN device endpoint could be scraped and decoded",
    metric_type: PrometheusType::Gauge,
};

pub const SCRAPES_TOTAL: MetricDesc = MetricDesc {
    name: "exporter_scrapes_total",
    help: "Scrape cycles run by this exporter",
    metric_type: PrometheusType::Counter,
};

pub const SCRAPE_FAILURES_TOTAL: MetricDesc = MetricDesc {
    name: "exporter_scrape_failures_total",
    help: "Failed endpoint scrapes, by endpoint",
    metric_type: PrometheusType::Counter,
};

pub const WAN_METRICS: &[WanMetric] = &[
    WanMetric {
        desc: MetricDesc {
            name: "connected",
            help: "Whether the WAN link of the Smart Hub is connected",
            metric_type: PrometheusType::Gauge,
        },
        value: |wan| u64::from(wan.is_connected),
    },
    WanMetric {
        desc: MetricDesc {
            name: "uptime_seconds",
            help: "Uptime of the Smart Hub in seconds",
            metric_type: PrometheusType::Gauge,
        },
        value: |wan| wan.uptime_seconds,
    },
    WanMetric {
        desc: MetricDesc {
            name: "downloaded_bytes",
            help: "How many bytes have been downloaded during the lifetime of the WAN connection",
            metric_type: PrometheusType::Counter,
        },
        value: |wan| wan.downloaded_bytes,
    },
    WanMetric {
        desc: MetricDesc {
            name: "uploaded_bytes",
            help: "How many bytes have been uploaded during the lifetime of the WAN connection",
            metric_type: PrometheusType::Counter,
        },
        value: |wan| wan.uploaded_bytes,
    },
    WanMetric {
        desc: MetricDesc {
            name: "download_rate",
            help: "The WAN connection speed for download in bits/sec (may be to the modem for FTTP)",
            metric_type: PrometheusType::Gauge,
        },
        value: |wan| wan.download_rate_bps,
    },
    WanMetric {
        desc: MetricDesc {
            name: "upload_rate",
            help: "The WAN connection speed for upload in bits/sec (may be to the modem for FTTP)",
            metric_type: PrometheusType::Gauge,
        },
        value: |wan| wan.upload_rate_bps,
    },
];

pub const DEVICE_METRICS: &[DeviceMetric] = &[
    DeviceMetric {
        desc: MetricDesc {
            name: "device_downloaded_bytes",
            help: "Bytes downloaded by a LAN device, as reported by the Smart Hub",
            metric_type: PrometheusType::Counter,
        },
        value: |device| device.downloaded_bytes,
    },
    DeviceMetric {
        desc: MetricDesc {
            name: "device_uploaded_bytes",
            help: "Bytes uploaded by a LAN device, as reported by the Smart Hub",
            metric_type: PrometheusType::Counter,
        },
        value: |device| device.uploaded_bytes,
    },
];

/// Identifying labels of a device series.
pub fn device_labels(device: &Device) -> Vec<(String, String)> {
    vec![
        ("mac".to_string(), device.mac.clone()),
        ("hostname".to_string(), device.hostname.clone()),
        ("ip".to_string(), device.ip.clone()),
    ]
}

/// Replace characters outside `[a-zA-Z0-9_]` (plus `:` when `allow_colon`)
/// with single underscores.
fn sanitize(name: &str, allow_colon: bool) -> String {
    let mut result = String::with_capacity(name.len() + 1);

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        result.push('_');
    }

    for c in name.chars() {
        let valid = c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':');
        let c = if valid { c } else { '_' };
        if c == '_' && result.ends_with('_') {
            continue;
        }
        result.push(c);
    }

    let trimmed = result.trim_end_matches('_').len();
    result.truncate(trimmed);
    result
}

/// Sanitize a metric name to match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn sanitize_metric_name(name: &str) -> String {
    let result = sanitize(name, true);
    if result.is_empty() {
        "unnamed".to_string()
    } else {
        result
    }
}

/// Sanitize a label name to match `[a-zA-Z_][a-zA-Z0-9_]*`.
///
/// Names starting with `__` are reserved by Prometheus and get a `z` prefix.
pub fn sanitize_label_name(name: &str) -> String {
    let result = sanitize(name, false);
    if result.is_empty() {
        "label".to_string()
    } else if result.starts_with("__") {
        format!("z{}", result)
    } else {
        result
    }
}

/// Build a full metric name: `{prefix}_{name}`.
pub fn build_metric_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        sanitize_metric_name(name)
    } else {
        sanitize_metric_name(&format!("{}_{}", prefix, name))
    }
}
