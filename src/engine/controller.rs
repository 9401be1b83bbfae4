//! Budget-metered charge control.
//!
//! One run meters the energy a vehicle draws against a prepaid budget and
//! stops the station when the budget is spent, the draw ends, the caller asks
//! for a stop, or the station can no longer be read.

use super::poller::Poller;
use crate::config::ControllerConfig;
use crate::error::{ChargeGateError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::station::{CommandIssuer, StationEndpoint, StationSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Why a charge run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    BudgetExhausted,
    StopRequested,
    DrawStopped,
    PollFailed(String),
    StartFailed(String),
}

/// Result of one charge run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeOutcome {
    /// Identifier of the run, also carried in its log lines
    pub run_id: String,
    /// Budget left in cents; slightly negative means fully consumed
    pub remaining_budget: f64,
    /// Energy billed against the budget
    pub metered_kwh: f64,
    pub reason: StopReason,
    /// Set when the final stop command could not be delivered
    pub stop_command_error: Option<String>,
}

impl ChargeOutcome {
    /// Remaining budget clamped at zero
    pub fn refundable(&self) -> f64 {
        self.remaining_budget.max(0.0)
    }
}

/// Seconds the budget lasts at `power_kw`: `(budget / price) / power * 3600`
pub fn seconds_of_budget_left(budget: f64, price_per_kwh: f64, power_kw: f64) -> f64 {
    (budget / price_per_kwh) / power_kw * 3600.0
}

pub struct ChargeController {
    poller: Arc<Poller>,
    commands: Arc<CommandIssuer>,
    policy: ControllerConfig,
}

impl ChargeController {
    pub fn new(poller: Arc<Poller>, commands: Arc<CommandIssuer>, policy: ControllerConfig) -> Self {
        Self {
            poller,
            commands,
            policy,
        }
    }

    /// Meter a charge run until it terminates.
    ///
    /// Only invalid inputs are returned as errors, before any I/O. Every
    /// other exit is an outcome, and every outcome follows a stop command.
    pub async fn run(
        &self,
        endpoint: &StationEndpoint,
        price_per_kwh: f64,
        budget: f64,
        mut stop: watch::Receiver<bool>,
    ) -> Result<ChargeOutcome> {
        if !price_per_kwh.is_finite() || price_per_kwh <= 0.0 {
            return Err(ChargeGateError::validation(
                "price",
                format!("price must be positive, got {}", price_per_kwh),
            ));
        }
        if !budget.is_finite() {
            return Err(ChargeGateError::validation("budget", "budget must be finite"));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let logger = get_logger_with_context(
            LogContext::new("controller")
                .with_station_id(&endpoint.id)
                .with_session_id(run_id.as_str()),
        );
        logger.info(&format!(
            "Charge run starting: budget={:.2} price={:.2}/kWh",
            budget, price_per_kwh
        ));

        let mut meter = Meter::new(budget, price_per_kwh, self.policy.idle_power_threshold_kw);
        let reason = self.metered_loop(endpoint, &mut meter, &mut stop, &logger).await;

        let stop_command_error = match self.commands.set_charging(endpoint, false).await {
            Ok(()) => None,
            Err(e) => {
                logger.error(&format!(
                    "STOP COMMAND FAILED, station may still be charging: {}",
                    e
                ));
                Some(e.to_string())
            }
        };

        let outcome = ChargeOutcome {
            run_id,
            remaining_budget: meter.budget,
            metered_kwh: meter.metered_kwh,
            reason,
            stop_command_error,
        };
        logger.info(&format!(
            "Charge run finished: {:?}, remaining budget {:.3}, metered {:.4} kWh",
            outcome.reason, outcome.remaining_budget, outcome.metered_kwh
        ));
        Ok(outcome)
    }

    async fn metered_loop(
        &self,
        endpoint: &StationEndpoint,
        meter: &mut Meter,
        stop: &mut watch::Receiver<bool>,
        logger: &StructuredLogger,
    ) -> StopReason {
        let initial = match self.poller.reconcile(endpoint).await {
            Ok(snapshot) => snapshot,
            Err(e) => return StopReason::PollFailed(e.to_string()),
        };

        if !meter.is_drawing(initial.power_or_zero())
            && let Err(e) = self.commands.set_charging(endpoint, true).await
        {
            return StopReason::StartFailed(e.to_string());
        }
        meter.begin(&initial);

        let max_cycle = self.policy.max_cycle();
        let idle_limit = self.policy.idle_cycles_before_stop;

        loop {
            if *stop.borrow() {
                return StopReason::StopRequested;
            }

            let Some(cycle) = meter.next_cycle(max_cycle) else {
                return StopReason::BudgetExhausted;
            };

            tokio::select! {
                _ = tokio::time::sleep(cycle) => {}
                _ = stop.changed() => return StopReason::StopRequested,
            }

            // A stop request interrupts a refresh that is still retrying
            let refreshed = tokio::select! {
                r = self.poller.refresh(endpoint) => r,
                _ = stop.changed() => return StopReason::StopRequested,
            };
            let sample = match refreshed {
                Ok(snapshot) => snapshot,
                Err(e) => return StopReason::PollFailed(e.to_string()),
            };
            meter.accrue(&sample);
            logger.debug(&format!(
                "Cycle: power={:.3} kW budget={:.3} idle_cycles={}",
                meter.last_power_kw, meter.budget, meter.idle_cycles
            ));

            if meter.has_drawn && meter.idle_cycles >= idle_limit.max(1) {
                return StopReason::DrawStopped;
            }
        }
    }
}

/// Budget bookkeeping for one run
#[derive(Debug)]
struct Meter {
    budget: f64,
    price_per_kwh: f64,
    idle_threshold_kw: f64,
    baseline_kwh: Option<f64>,
    last_power_kw: f64,
    metered_kwh: f64,
    has_drawn: bool,
    idle_cycles: u32,
}

impl Meter {
    fn new(budget: f64, price_per_kwh: f64, idle_threshold_kw: f64) -> Self {
        Self {
            budget,
            price_per_kwh,
            idle_threshold_kw,
            baseline_kwh: None,
            last_power_kw: 0.0,
            metered_kwh: 0.0,
            has_drawn: false,
            idle_cycles: 0,
        }
    }

    fn is_drawing(&self, power_kw: f64) -> bool {
        power_kw > self.idle_threshold_kw
    }

    fn begin(&mut self, initial: &StationSnapshot) {
        self.baseline_kwh = initial.energy_total_kwh;
        self.last_power_kw = initial.power_or_zero();
        self.has_drawn = self.is_drawing(self.last_power_kw);
    }

    /// Sleep before the next sample, or `None` once the budget is spent
    fn next_cycle(&self, max_cycle: Duration) -> Option<Duration> {
        if self.is_drawing(self.last_power_kw) {
            let left = seconds_of_budget_left(self.budget, self.price_per_kwh, self.last_power_kw);
            if left <= 0.0 {
                return None;
            }
            Some(Duration::from_secs_f64(left.min(max_cycle.as_secs_f64())))
        } else if self.budget <= 0.0 {
            None
        } else {
            Some(max_cycle)
        }
    }

    fn accrue(&mut self, sample: &StationSnapshot) {
        let power = sample.power_or_zero();
        if self.is_drawing(power) {
            if let (Some(base), Some(energy)) = (self.baseline_kwh, sample.energy_total_kwh) {
                let delta = (energy - base).max(0.0);
                self.metered_kwh += delta;
                self.budget -= delta * self.price_per_kwh;
            }
            self.has_drawn = true;
            self.idle_cycles = 0;
        } else if self.has_drawn {
            self.idle_cycles += 1;
        }
        if sample.energy_total_kwh.is_some() {
            self.baseline_kwh = sample.energy_total_kwh;
        }
        self.last_power_kw = power;
    }
}
