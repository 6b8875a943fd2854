//! Decoder for `/cgi/cgi_basicMyDevice.js`.
//!
//! The router serves a script rather than JSON. Evaluating it defines two
//! arrays of objects with percent-encoded string fields:
//!
//! - `known_device_list`: one entry per device (`mac`, `hostname`, `ip`, ...)
//! - `rate`: traffic counters (`mac`, `tx`, `rx`), MACs in lowercase
//!
//! Both are keyed by canonical MAC and joined into [`Device`]s.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::escape::{canonical_mac, url_decode_lossy};
use crate::literal::EvalLimits;
use crate::model::Device;
use crate::script::ScriptContext;

pub const DEVICE_LIST_BINDING: &str = "known_device_list";
pub const RATE_BINDING: &str = "rate";

/// Configuration hook the script calls before defining its data.
pub const SETUP_HOOK: &str = "addCfg";

/// Field name to decoded value.
type Record = HashMap<String, String>;

/// Decode the LAN device script with the default evaluation limits.
pub fn decode_lan_payload(raw: &[u8]) -> Result<Vec<Device>, DecodeError> {
    decode_lan_payload_with_limits(raw, EvalLimits::default())
}

/// Decode the LAN device script.
///
/// Devices are returned ordered by MAC. A device without a rate entry gets
/// zero counters.
pub fn decode_lan_payload_with_limits(
    raw: &[u8],
    limits: EvalLimits,
) -> Result<Vec<Device>, DecodeError> {
    let script = std::str::from_utf8(raw)
        .map_err(|e| DecodeError::format(format!("LAN payload is not UTF-8: {}", e)))?;
    trace!(payload = %script, "Decoding LAN payload");

    let (device_list, rate_list) = {
        let mut context = ScriptContext::new(limits).with_stub(SETUP_HOOK);
        context.eval(script)?;
        (
            context.take_global(DEVICE_LIST_BINDING),
            context.take_global(RATE_BINDING),
        )
    };

    let devices = records_by_mac(DEVICE_LIST_BINDING, device_list, MissingMac::Fail)?;
    trace!(?devices, "LAN devices");
    let rates = records_by_mac(RATE_BINDING, rate_list, MissingMac::Skip)?;
    trace!(?rates, "LAN rates");

    Ok(devices
        .into_iter()
        .map(|(mac, identity)| {
            let rate = rates.get(&mac);
            join_device(mac, &identity, rate)
        })
        .collect())
}

/// What to do with a record that has no usable `mac`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingMac {
    /// Fail the decode: the record is a device with no identity.
    Fail,
    /// Drop the record: only its counters are lost.
    Skip,
}

/// Convert an array binding into records keyed by canonical MAC.
///
/// `null` entries are skipped. A later entry with the same MAC replaces an
/// earlier one.
fn records_by_mac(
    binding: &str,
    value: Option<Value>,
    missing_mac: MissingMac,
) -> Result<BTreeMap<String, Record>, DecodeError> {
    let value = value
        .ok_or_else(|| DecodeError::structure(format!("binding '{}' is not defined", binding)))?;
    let Value::Array(entries) = value else {
        return Err(DecodeError::structure(format!(
            "binding '{}' is not an array",
            binding
        )));
    };

    let mut by_mac = BTreeMap::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let fields = match entry {
            Value::Null => continue,
            Value::Object(fields) => fields,
            other => {
                return Err(DecodeError::structure(format!(
                    "{}[{}] is not an object: {}",
                    binding, index, other
                )));
            }
        };

        let record = decode_record(fields);
        let Some(mac) = record
            .get("mac")
            .filter(|mac| !mac.trim().is_empty())
            .map(|mac| canonical_mac(mac))
        else {
            match missing_mac {
                MissingMac::Fail => {
                    return Err(DecodeError::missing(format!(
                        "{}[{}] has no 'mac' field",
                        binding, index
                    )));
                }
                MissingMac::Skip => {
                    debug!(binding, index, "Skipping entry without a MAC");
                    continue;
                }
            }
        };

        if by_mac.insert(mac.clone(), record).is_some() {
            debug!(binding, mac = %mac, "Duplicate MAC, keeping the later entry");
        }
    }

    Ok(by_mac)
}

/// Percent-decode string fields and stringify other scalars.
fn decode_record(fields: Map<String, Value>) -> Record {
    fields
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => url_decode_lossy(&s),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key, text))
        })
        .collect()
}

fn join_device(mac: String, identity: &Record, rate: Option<&Record>) -> Device {
    let uploaded_bytes = counter(&mac, rate, "tx");
    let downloaded_bytes = counter(&mac, rate, "rx");

    Device {
        hostname: identity.get("hostname").cloned().unwrap_or_default(),
        ip: identity.get("ip").cloned().unwrap_or_default(),
        mac,
        downloaded_bytes,
        uploaded_bytes,
    }
}

/// A traffic counter, or zero when absent or not an integer.
fn counter(mac: &str, rate: Option<&Record>, field: &str) -> u64 {
    let Some(value) = rate.and_then(|r| r.get(field)) else {
        return 0;
    };

    value.trim().parse().unwrap_or_else(|_| {
        debug!(mac, field, value = %value, "Ignoring non-integer traffic counter");
        0
    })
}
