//! Cable-transition detection.
//!
//! A pure state step: no I/O, no clock. The monitor loop threads the
//! [`SessionLifecycle`] from one cycle to the next.

use super::events::SessionEvent;
use crate::station::{CableState, StationSnapshot};

/// Per-station lifecycle carried between monitor cycles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLifecycle {
    /// Snapshot taken when a cable was connected
    pub charge_start: Option<StationSnapshot>,
    pub ready_hook_fired: bool,
}

/// Compare two consecutive snapshots and emit lifecycle events
pub fn detect(
    station_id: &str,
    previous: &StationSnapshot,
    current: &StationSnapshot,
    lifecycle: SessionLifecycle,
) -> (SessionLifecycle, Vec<SessionEvent>) {
    let mut next = lifecycle;
    let mut events = Vec::new();

    if !next.ready_hook_fired {
        events.push(SessionEvent::EngineReady {
            station_id: station_id.to_string(),
        });
        next.ready_hook_fired = true;
    }

    if previous.cable_state == CableState::Unknown
        || current.cable_state == previous.cable_state
    {
        return (next, events);
    }

    match current.cable_state {
        CableState::ReadyToCharge | CableState::ReadyToNegotiate => {
            if next.charge_start.is_none() {
                next.charge_start = Some(current.clone());
            }
        }
        CableState::NoCable => {
            events.push(SessionEvent::SessionEnded {
                station_id: station_id.to_string(),
                start: next.charge_start.take(),
                end: current.clone(),
            });
        }
        CableState::Unknown => {}
    }

    (next, events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snap(energy: f64, cable: CableState) -> StationSnapshot {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        StationSnapshot::measured(energy, 0.0, cable, at)
    }

    #[test]
    fn ready_fires_once() {
        let a = snap(1.0, CableState::NoCable);
        let (state, events) = detect("st", &StationSnapshot::unknown(), &a, SessionLifecycle::default());
        assert_eq!(
            events,
            vec![SessionEvent::EngineReady {
                station_id: "st".into()
            }]
        );
        let (_, events) = detect("st", &a, &a, state);
        assert!(events.is_empty());
    }

    #[test]
    fn transition_from_unknown_is_ignored() {
        let state = SessionLifecycle {
            ready_hook_fired: true,
            ..Default::default()
        };
        let current = snap(1.0, CableState::ReadyToCharge);
        let (next, events) = detect("st", &StationSnapshot::unknown(), &current, state);
        assert!(events.is_empty());
        assert!(next.charge_start.is_none());
    }

    #[test]
    fn negotiate_then_charge_keeps_first_start() {
        let state = SessionLifecycle {
            ready_hook_fired: true,
            ..Default::default()
        };
        let idle = snap(1.0, CableState::NoCable);
        let negotiate = snap(1.5, CableState::ReadyToNegotiate);
        let charge = snap(2.0, CableState::ReadyToCharge);

        let (state, _) = detect("st", &idle, &negotiate, state);
        let (state, events) = detect("st", &negotiate, &charge, state);
        assert!(events.is_empty());
        assert_eq!(state.charge_start, Some(negotiate));
    }
}
