//! Settlement desk.
//!
//! Payment work runs off the monitor and controller paths: requests are
//! queued to a background task that executes each one in a tracked
//! `JoinSet` and broadcasts a [`SettlementOutcome`] per completed request.

use crate::error::{ChargeGateError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::market::PricingService;
use crate::payment::PaymentRail;
use crate::station::StationSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// Work accepted by the desk
#[derive(Debug, Clone)]
pub enum SettlementRequest {
    /// Bill a finished session to the operator
    SessionCharge {
        station_id: String,
        start: StationSnapshot,
        end: StationSnapshot,
    },
    /// Return unspent budget to the driver
    Refund {
        station_id: String,
        to: String,
        amount: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    SessionCharge,
    Refund,
}

/// Result of one executed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementOutcome {
    pub station_id: String,
    pub kind: SettlementKind,
    pub amount: f64,
    pub success: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Accounts and thresholds the desk settles with
#[derive(Debug, Clone)]
pub struct SettlementSettings {
    pub operator_account: String,
    /// Refunds at or below this amount are skipped
    pub dust_threshold: f64,
}

struct DeskContext {
    rail: Arc<dyn PaymentRail>,
    pricing: Arc<PricingService>,
    settings: SettlementSettings,
    logger: StructuredLogger,
}

pub struct SettlementDesk {
    requests: mpsc::UnboundedSender<SettlementRequest>,
    outcomes: broadcast::Sender<SettlementOutcome>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SettlementDesk {
    /// Spawn the desk's background task on the current runtime
    pub fn start(
        rail: Arc<dyn PaymentRail>,
        pricing: Arc<PricingService>,
        settings: SettlementSettings,
    ) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        let (outcomes, _) = broadcast::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(DeskContext {
            rail,
            pricing,
            settings,
            logger: get_logger("settlement"),
        });
        let worker = tokio::spawn(run_desk(ctx, rx, shutdown_rx, outcomes.clone()));

        Self {
            requests,
            outcomes,
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a request; fails only once the desk has shut down
    pub fn submit(&self, request: SettlementRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| ChargeGateError::payment("settlement desk is closed"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementOutcome> {
        self.outcomes.subscribe()
    }

    /// Stop accepting requests and wait for queued and running ones to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_desk(
    ctx: Arc<DeskContext>,
    mut rx: mpsc::UnboundedReceiver<SettlementRequest>,
    mut shutdown: watch::Receiver<bool>,
    outcomes: broadcast::Sender<SettlementOutcome>,
) {
    let mut tasks: JoinSet<Option<SettlementOutcome>> = JoinSet::new();

    loop {
        tokio::select! {
            request = rx.recv() => match request {
                Some(request) => {
                    tasks.spawn(execute(ctx.clone(), request));
                }
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    rx.close();
                    while let Ok(request) = rx.try_recv() {
                        tasks.spawn(execute(ctx.clone(), request));
                    }
                    break;
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                publish(&ctx, &outcomes, joined);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        publish(&ctx, &outcomes, joined);
    }
    ctx.logger.info("Settlement desk drained");
}

fn publish(
    ctx: &DeskContext,
    outcomes: &broadcast::Sender<SettlementOutcome>,
    joined: std::result::Result<Option<SettlementOutcome>, JoinError>,
) {
    match joined {
        Ok(Some(outcome)) => {
            if outcome.success {
                ctx.logger.info(&format!(
                    "Settled {:?} for {}: {:.2}",
                    outcome.kind, outcome.station_id, outcome.amount
                ));
            } else {
                ctx.logger.error(&format!(
                    "Settlement {:?} FAILED for station {} amount {:.2} at {}: {}",
                    outcome.kind,
                    outcome.station_id,
                    outcome.amount,
                    outcome.at.to_rfc3339(),
                    outcome.error.as_deref().unwrap_or("unknown error")
                ));
            }
            let _ = outcomes.send(outcome);
        }
        Ok(None) => {}
        Err(e) => ctx
            .logger
            .error(&format!("Settlement task aborted: {}", e)),
    }
}

async fn execute(ctx: Arc<DeskContext>, request: SettlementRequest) -> Option<SettlementOutcome> {
    match request {
        SettlementRequest::SessionCharge {
            station_id,
            start,
            end,
        } => Some(settle_session(&ctx, station_id, &start, &end).await),
        SettlementRequest::Refund {
            station_id,
            to,
            amount,
        } => refund(&ctx, station_id, &to, amount).await,
    }
}

/// Energy between two snapshots, clamped at zero
pub fn session_energy_kwh(start: &StationSnapshot, end: &StationSnapshot) -> f64 {
    match (start.energy_total_kwh, end.energy_total_kwh) {
        (Some(a), Some(b)) => (b - a).max(0.0),
        _ => 0.0,
    }
}

async fn settle_session(
    ctx: &DeskContext,
    station_id: String,
    start: &StationSnapshot,
    end: &StationSnapshot,
) -> SettlementOutcome {
    let energy = session_energy_kwh(start, end);
    let price = ctx.pricing.price().await;
    let due = energy * price;
    ctx.logger.info(&format!(
        "Session on {} ended: {:.4} kWh at {:.2} = {:.2} due",
        station_id, energy, price, due
    ));

    if due <= 0.0 {
        return outcome(station_id, SettlementKind::SessionCharge, 0.0, Ok(()));
    }

    let balance = match ctx.rail.get_balance(&station_id).await {
        Ok(b) => b,
        Err(e) => return outcome(station_id, SettlementKind::SessionCharge, due, Err(e)),
    };

    let amount = if balance < due {
        ctx.logger.warn(&format!(
            "Station {} holds {:.2}, short of {:.2} due; collecting balance only",
            station_id, balance, due
        ));
        balance.max(0.0)
    } else {
        due
    };

    if amount <= 0.0 {
        let err = ChargeGateError::payment(format!("{} has no funds to collect", station_id));
        return outcome(station_id, SettlementKind::SessionCharge, due, Err(err));
    }

    let result = ctx
        .rail
        .pay_out(&station_id, &ctx.settings.operator_account, amount)
        .await;
    outcome(station_id, SettlementKind::SessionCharge, amount, result)
}

async fn refund(
    ctx: &DeskContext,
    station_id: String,
    to: &str,
    amount: f64,
) -> Option<SettlementOutcome> {
    if amount <= ctx.settings.dust_threshold {
        ctx.logger.debug(&format!(
            "Refund of {:.4} from {} is below the dust threshold, skipped",
            amount, station_id
        ));
        return None;
    }
    let result = ctx.rail.pay_out(&station_id, to, amount).await;
    Some(outcome(station_id, SettlementKind::Refund, amount, result))
}

fn outcome(
    station_id: String,
    kind: SettlementKind,
    amount: f64,
    result: Result<()>,
) -> SettlementOutcome {
    let error = result.err().map(|e| e.to_string());
    SettlementOutcome {
        station_id,
        kind,
        amount,
        success: error.is_none(),
        error,
        at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::CableState;

    #[test]
    fn energy_is_clamped() {
        let now = Utc::now();
        let a = StationSnapshot::measured(10.0, 0.0, CableState::ReadyToCharge, now);
        let b = StationSnapshot::measured(12.5, 0.0, CableState::NoCable, now);
        assert_eq!(session_energy_kwh(&a, &b), 2.5);
        assert_eq!(session_energy_kwh(&b, &a), 0.0);
        assert_eq!(session_energy_kwh(&StationSnapshot::unknown(), &b), 0.0);
    }
}
