//! Station status read model
//!
//! [`StatusReport`] is the typed view; [`StatusView`] is its JSON rendering
//! for the dashboard, which expects `-1` for unknown numbers and the Unix
//! epoch for an unknown update time.

use crate::station::StationSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub station_id: String,
    pub co2: Option<f64>,
    /// Cents per kWh, fallback applied
    pub price: f64,
    pub balance: Option<f64>,
    pub snapshot: StationSnapshot,
    /// Time since the snapshot was accepted
    pub age: Option<Duration>,
    /// A charge run is active for this station
    pub charging: bool,
    /// The device could not be read; `snapshot` is the last known one
    pub stale: bool,
}

/// Wire shape of a status report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub id: String,
    pub co2: f64,
    pub price: f64,
    pub balance: f64,
    #[serde(rename = "kW")]
    pub kw: f64,
    #[serde(rename = "kWhTotal")]
    pub kwh_total: f64,
    pub cable: i32,
    pub last_update: DateTime<Utc>,
    pub age_seconds: f64,
    pub charging: bool,
    pub stale: bool,
}

const UNKNOWN: f64 = -1.0;

impl From<&StatusReport> for StatusView {
    fn from(report: &StatusReport) -> Self {
        Self {
            id: report.station_id.clone(),
            co2: report.co2.unwrap_or(UNKNOWN),
            price: report.price,
            balance: report.balance.unwrap_or(UNKNOWN),
            kw: report.snapshot.power_kw.unwrap_or(UNKNOWN),
            kwh_total: report.snapshot.energy_total_kwh.unwrap_or(UNKNOWN),
            cable: report.snapshot.cable_state.code(),
            last_update: report.snapshot.last_update.unwrap_or(DateTime::UNIX_EPOCH),
            age_seconds: report.age.map(|a| a.as_secs_f64()).unwrap_or(UNKNOWN),
            charging: report.charging,
            stale: report.stale,
        }
    }
}
