//! Smart Hub Common Library
//!
//! This crate decodes the undocumented status endpoints of a BT Smart Hub
//! style home router into typed data:
//!
//! - [`wan`] - `/nonAuth/wan_conn.xml` into [`ConnectionDetails`]
//! - [`lan`] - `/cgi/cgi_basicMyDevice.js` into a list of [`Device`]
//! - [`nested`] - the quoted, percent-encoded nested arrays used by the WAN document
//! - [`literal`] / [`script`] - the JavaScript subset of the device script
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types
//!
//! All decoders are pure functions over the payload bytes.

pub mod config;
pub mod error;
pub mod escape;
pub mod lan;
pub mod literal;
pub mod model;
pub mod nested;
pub mod script;
pub mod wan;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, load_config, parse_config};
pub use error::{DecodeError, DecodeErrorKind, Error, Result};
pub use lan::{decode_lan_payload, decode_lan_payload_with_limits};
pub use literal::EvalLimits;
pub use model::{ConnectionDetails, Device};
pub use nested::{decode_nested_first, decode_nested_first_ints};
pub use script::ScriptContext;
pub use wan::decode_wan_payload;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// # Example
///
/// ```ignore
/// use smarthub_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
