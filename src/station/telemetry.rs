use super::StationEndpoint;
use super::transport::DeviceTransport;
use super::types::StationSnapshot;
use super::xml;
use crate::error::{ChargeGateError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::Utc;
use std::sync::Arc;

pub const ENERGY_OPERATION: &str = "getActiveEnergyImport";
pub const POWER_OPERATION: &str = "getACActivePower";
pub const VEHICLE_STATE_OPERATION: &str = "getCurrentVehicleState";

/// Issues the station's read-only queries and assembles a snapshot
pub struct TelemetryFetcher {
    transport: Arc<dyn DeviceTransport>,
    logger: StructuredLogger,
}

impl TelemetryFetcher {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            logger: get_logger("telemetry"),
        }
    }

    /// Read energy, power and vehicle state concurrently.
    ///
    /// Any failed query fails the whole fetch. The snapshot is not validated
    /// here; callers decide whether to accept it.
    pub async fn fetch(&self, endpoint: &StationEndpoint) -> Result<StationSnapshot> {
        let (energy, power, vehicle) = tokio::try_join!(
            self.query(endpoint, ENERGY_OPERATION),
            self.query(endpoint, POWER_OPERATION),
            self.query(endpoint, VEHICLE_STATE_OPERATION),
        )?;

        let energy_total_kwh = xml::decode_value(&energy)?;
        let power_kw = xml::decode_value(&power)?;
        let cable_state = xml::decode_status(&vehicle)?;

        self.logger.trace(&format!(
            "Station {}: energy={} kWh power={} kW cable={:?}",
            endpoint.id, energy_total_kwh, power_kw, cable_state
        ));

        Ok(StationSnapshot::measured(
            energy_total_kwh,
            power_kw,
            cable_state,
            Utc::now(),
        ))
    }

    async fn query(&self, endpoint: &StationEndpoint, operation: &str) -> Result<String> {
        let url = endpoint.operation_url(operation);
        let resp = self.transport.get(&url).await?;
        if !resp.is_success() {
            return Err(ChargeGateError::transport(format!(
                "{} returned HTTP {}",
                operation, resp.status
            )));
        }
        Ok(resp.body)
    }
}
