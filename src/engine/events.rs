use super::controller::ChargeOutcome;
use crate::station::StationSnapshot;
use serde::Serialize;

/// Lifecycle notifications published on the engine's event channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// First successful reconciliation of a monitored station
    EngineReady { station_id: String },
    /// Cable removed; `start` is the snapshot taken when it was plugged in
    SessionEnded {
        station_id: String,
        start: Option<StationSnapshot>,
        end: StationSnapshot,
    },
    /// A budget-metered charge run began
    ChargeStarted {
        station_id: String,
        budget: f64,
        price: f64,
    },
    /// A budget-metered charge run terminated
    ChargeFinished {
        station_id: String,
        outcome: ChargeOutcome,
    },
}

impl SessionEvent {
    pub fn station_id(&self) -> &str {
        match self {
            SessionEvent::EngineReady { station_id }
            | SessionEvent::SessionEnded { station_id, .. }
            | SessionEvent::ChargeStarted { station_id, .. }
            | SessionEvent::ChargeFinished { station_id, .. } => station_id,
        }
    }

    /// SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::EngineReady { .. } => "engine_ready",
            SessionEvent::SessionEnded { .. } => "session_ended",
            SessionEvent::ChargeStarted { .. } => "charge_started",
            SessionEvent::ChargeFinished { .. } => "charge_finished",
        }
    }
}
