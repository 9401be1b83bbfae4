use super::StationEndpoint;
use super::transport::DeviceTransport;
use crate::error::{ChargeGateError, Result};
use crate::logging::{StructuredLogger, get_logger};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Accepted current limit in amperes
pub const CURRENT_LIMIT_RANGE: RangeInclusive<u32> = 1..=32;

/// Write path to the station. One attempt per command, never retried.
pub struct CommandIssuer {
    transport: Arc<dyn DeviceTransport>,
    logger: StructuredLogger,
}

impl CommandIssuer {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            logger: get_logger("commands"),
        }
    }

    /// Enable or disable charging
    pub async fn set_charging(&self, endpoint: &StationEndpoint, on: bool) -> Result<()> {
        let operation = format!("enableCharging/{}", on);
        self.write(endpoint, &operation).await?;
        self.logger.info(&format!(
            "Station {}: charging {}",
            endpoint.id,
            if on { "enabled" } else { "disabled" }
        ));
        Ok(())
    }

    /// Set the charge current limit in amperes
    pub async fn set_current_limit(&self, endpoint: &StationEndpoint, amps: u32) -> Result<()> {
        if !CURRENT_LIMIT_RANGE.contains(&amps) {
            return Err(ChargeGateError::validation(
                "amps",
                format!(
                    "{} A outside {}..={} A",
                    amps,
                    CURRENT_LIMIT_RANGE.start(),
                    CURRENT_LIMIT_RANGE.end()
                ),
            ));
        }
        let operation = format!("setCurrentLimit/{}", amps);
        self.write(endpoint, &operation).await?;
        self.logger
            .info(&format!("Station {}: current limit {} A", endpoint.id, amps));
        Ok(())
    }

    async fn write(&self, endpoint: &StationEndpoint, operation: &str) -> Result<()> {
        let url = endpoint.operation_url(operation);
        let resp = self.transport.put(&url).await.map_err(|e| {
            ChargeGateError::command(format!("{} on {} failed: {}", operation, endpoint.id, e))
        })?;
        if !resp.is_success() {
            return Err(ChargeGateError::command(format!(
                "{} on {} returned HTTP {}",
                operation, endpoint.id, resp.status
            )));
        }
        Ok(())
    }
}
