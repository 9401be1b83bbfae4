//! Station device access
//!
//! Everything that talks to the charging station's XML/HTTP web service:
//! endpoint addressing, the transport seam, envelope decoding, the
//! read-only telemetry queries and the write commands.

use crate::error::{ChargeGateError, Result};
use reqwest::Url;
use serde::Serialize;

pub mod commands;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod xml;

pub use commands::CommandIssuer;
pub use telemetry::TelemetryFetcher;
pub use transport::{DeviceResponse, DeviceTransport, HttpTransport};
pub use types::{CableState, StationSnapshot};

/// Address of one station's device web service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationEndpoint {
    /// Station identifier; also the station's payment account
    pub id: String,
    service_url: String,
}

impl StationEndpoint {
    /// Build an endpoint, replacing the path of `base_url` with `service_path`
    pub fn new(id: &str, base_url: &str, service_path: &str) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(ChargeGateError::validation("id", "Station id cannot be empty"));
        }
        let mut url = Url::parse(base_url.trim()).map_err(|e| {
            ChargeGateError::validation("url", format!("Invalid station url '{}': {}", base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChargeGateError::validation(
                "url",
                format!("Unsupported scheme '{}'", url.scheme()),
            ));
        }
        url.set_path(service_path);
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self {
            id: id.to_string(),
            service_url: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Root URL of the device web service
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// URL of a single device operation, e.g. `getACActivePower`
    pub fn operation_url(&self, operation: &str) -> String {
        format!("{}/{}", self.service_url, operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SERVICE_PATH;

    #[test]
    fn test_endpoint_replaces_path() {
        let ep = StationEndpoint::new("st-1", "http://10.0.0.20:8080/ignored?x=1", DEFAULT_SERVICE_PATH)
            .unwrap();
        assert_eq!(
            ep.service_url(),
            "http://10.0.0.20:8080/typebased_WS_EVSE/EVSEWebService/Toppen_EVSE"
        );
        assert_eq!(
            ep.operation_url("getACActivePower"),
            "http://10.0.0.20:8080/typebased_WS_EVSE/EVSEWebService/Toppen_EVSE/getACActivePower"
        );
    }

    #[test]
    fn test_endpoint_rejects_bad_input() {
        assert!(StationEndpoint::new("st-1", "not a url", DEFAULT_SERVICE_PATH).is_err());
        assert!(StationEndpoint::new("st-1", "ftp://host", DEFAULT_SERVICE_PATH).is_err());
        assert!(StationEndpoint::new(" ", "http://host", DEFAULT_SERVICE_PATH).is_err());
    }
}
