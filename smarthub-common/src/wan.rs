//! Decoder for `/nonAuth/wan_conn.xml`.
//!
//! The document is XML, but the interesting data sits in `value`
//! attributes holding single-quoted nested arrays whose first element is a
//! percent-encoded, `;`-delimited list. Field positions follow the script
//! in the router's `/broadband.htm`:
//!
//! - `wan_conn_status_list`: `[0]` connected/disconnected
//! - `wan_conn_volume_list`: `[1]` downloaded bytes, `[2]` uploaded bytes
//! - `status_rate`: `[0]` upload bits/sec, `[1]` download bits/sec
//! - `sysuptime`: plain integer, seconds

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::trace;

use crate::error::DecodeError;
use crate::model::ConnectionDetails;
use crate::nested::{decode_nested_first, decode_nested_first_ints};

pub const STATUS_ELEMENT: &str = "wan_conn_status_list";
pub const VOLUME_ELEMENT: &str = "wan_conn_volume_list";
pub const RATE_ELEMENT: &str = "status_rate";
pub const UPTIME_ELEMENT: &str = "sysuptime";

const ELEMENTS: [&str; 4] = [STATUS_ELEMENT, VOLUME_ELEMENT, RATE_ELEMENT, UPTIME_ELEMENT];

/// Status text reported while the WAN link is up.
const CONNECTED: &str = "connected";

/// Decode the WAN connection document.
///
/// Any failing field fails the whole decode.
pub fn decode_wan_payload(raw: &[u8]) -> Result<ConnectionDetails, DecodeError> {
    let xml = std::str::from_utf8(raw)
        .map_err(|e| DecodeError::format(format!("WAN payload is not UTF-8: {}", e)))?;
    trace!(payload = %xml, "Decoding WAN payload");

    let attributes = ValueAttributes::read(xml)?;

    let uptime = attributes.require(UPTIME_ELEMENT)?;
    let uptime_seconds = uptime.parse::<u64>().map_err(|e| {
        DecodeError::format(format!("{} value '{}' is not an integer: {}", UPTIME_ELEMENT, uptime, e))
    })?;

    let status = decode_nested_first(attributes.require(STATUS_ELEMENT)?)?;
    let is_connected = status.first().is_some_and(|s| s == CONNECTED);

    let volume = decode_nested_first_ints(attributes.require(VOLUME_ELEMENT)?)?;
    let (downloaded_bytes, uploaded_bytes) = match volume.as_slice() {
        [_, downloaded, uploaded, ..] => (*downloaded, *uploaded),
        _ => {
            return Err(DecodeError::format(format!(
                "{} has {} fields, expected at least 3",
                VOLUME_ELEMENT,
                volume.len()
            )));
        }
    };

    let rate = decode_nested_first_ints(attributes.require(RATE_ELEMENT)?)?;
    let (upload_rate_bps, download_rate_bps) = match rate.as_slice() {
        [upload, download, ..] => (*upload, *download),
        _ => {
            return Err(DecodeError::format(format!(
                "{} has {} fields, expected at least 2",
                RATE_ELEMENT,
                rate.len()
            )));
        }
    };

    Ok(ConnectionDetails {
        is_connected,
        uptime_seconds,
        downloaded_bytes,
        uploaded_bytes,
        download_rate_bps,
        upload_rate_bps,
    })
}

/// `value` attributes of the known elements directly under the root.
///
/// A present key with `None` means the element exists without a `value`.
#[derive(Debug, Default)]
struct ValueAttributes {
    values: HashMap<&'static str, Option<String>>,
}

impl ValueAttributes {
    fn read(xml: &str) -> Result<Self, DecodeError> {
        let mut reader = Reader::from_str(xml);
        let mut attributes = Self::default();
        let mut depth = 0usize;
        let mut saw_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(element) => {
                    if depth == 1 {
                        attributes.capture(&element)?;
                    }
                    depth += 1;
                    saw_root = true;
                }
                Event::Empty(element) => {
                    if depth == 1 {
                        attributes.capture(&element)?;
                    }
                    saw_root = true;
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(DecodeError::structure("WAN document has no root element"));
        }
        Ok(attributes)
    }

    fn capture(&mut self, element: &BytesStart<'_>) -> Result<(), DecodeError> {
        let local_name = element.local_name();
        let Some(name) = ELEMENTS
            .into_iter()
            .find(|name| name.as_bytes() == local_name.as_ref())
        else {
            return Ok(());
        };

        // First occurrence wins
        let Entry::Vacant(slot) = self.values.entry(name) else {
            return Ok(());
        };

        let value = element
            .try_get_attribute("value")
            .map_err(|e| DecodeError::format(format!("malformed attribute on '{}': {}", name, e)))?
            .map(|attr| attr.unescape_value().map(|v| v.into_owned()))
            .transpose()?;

        slot.insert(value);
        Ok(())
    }

    fn require(&self, name: &str) -> Result<&str, DecodeError> {
        match self.values.get(name) {
            None => Err(DecodeError::structure(format!("element '{}' not found", name))),
            Some(None) => Err(DecodeError::structure(format!(
                "element '{}' has no value attribute",
                name
            ))),
            Some(Some(value)) => Ok(value),
        }
    }
}
