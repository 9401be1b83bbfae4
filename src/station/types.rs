use crate::error::{ChargeGateError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connector status reported by `getCurrentVehicleState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CableState {
    /// Never observed, or reported as invalid by the device
    #[default]
    Unknown,
    NoCable,
    ReadyToNegotiate,
    ReadyToCharge,
}

impl CableState {
    /// Map a device status code. `-1` is the device's own "invalid" marker.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            -1 => Ok(CableState::Unknown),
            1 => Ok(CableState::NoCable),
            2 => Ok(CableState::ReadyToNegotiate),
            3 => Ok(CableState::ReadyToCharge),
            other => Err(ChargeGateError::decode(format!(
                "Unknown vehicle state code {}",
                other
            ))),
        }
    }

    /// Numeric code as exposed on the status wire
    pub fn code(self) -> i32 {
        match self {
            CableState::Unknown => -1,
            CableState::NoCable => 1,
            CableState::ReadyToNegotiate => 2,
            CableState::ReadyToCharge => 3,
        }
    }

    /// A vehicle is plugged in
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            CableState::ReadyToNegotiate | CableState::ReadyToCharge
        )
    }
}

/// One complete reading of a station
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StationSnapshot {
    /// Accumulated imported energy in kWh
    pub energy_total_kwh: Option<f64>,
    /// Instantaneous active power in kW
    pub power_kw: Option<f64>,
    pub cable_state: CableState,
    /// Wall-clock time of the device read
    pub last_update: Option<DateTime<Utc>>,
}

impl StationSnapshot {
    /// Placeholder for a station that has never been read
    pub fn unknown() -> Self {
        Self::default()
    }

    /// A snapshot taken from the device
    pub fn measured(
        energy_total_kwh: f64,
        power_kw: f64,
        cable_state: CableState,
        last_update: DateTime<Utc>,
    ) -> Self {
        Self {
            energy_total_kwh: Some(energy_total_kwh),
            power_kw: Some(power_kw),
            cable_state,
            last_update: Some(last_update),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.last_update.is_none()
    }

    /// Reject readings that cannot be physical: non-finite or negative power/energy
    pub fn validate(&self) -> Result<()> {
        check_quantity("power_kw", self.power_kw)?;
        check_quantity("energy_total_kwh", self.energy_total_kwh)?;
        Ok(())
    }

    /// Draw in kW, treating an unknown reading as no draw
    pub fn power_or_zero(&self) -> f64 {
        self.power_kw.unwrap_or(0.0)
    }
}

fn check_quantity(field: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() => {
            Err(ChargeGateError::validation(field, format!("value {} is not finite", v)))
        }
        Some(v) if v < 0.0 => Err(ChargeGateError::validation(
            field,
            format!("negative value {}", v),
        )),
        _ => Ok(()),
    }
}
