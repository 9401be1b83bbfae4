//! Charging-session state engine
//!
//! [`ChargingEngine`] owns the session cache and the per-station tasks built
//! on it: reconciliation monitors that detect cable transitions, and
//! budget-metered charge controllers. Request handlers call into it with
//! plain method calls.

use crate::config::Config;
use crate::error::{ChargeGateError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::market::{HttpMarketFeed, MarketFeed, PricingService};
use crate::payment::{PaymentRail, rail_from_config};
use crate::station::{
    CableState, CommandIssuer, DeviceTransport, HttpTransport, StationEndpoint, TelemetryFetcher,
};
use crate::status::StatusReport;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub mod cache;
pub mod controller;
pub mod detector;
pub mod events;
pub mod monitor;
pub mod poller;
pub mod settlement;

pub use cache::SessionCache;
pub use controller::{ChargeController, ChargeOutcome, StopReason};
pub use detector::{SessionLifecycle, detect};
pub use events::SessionEvent;
pub use monitor::StationMonitor;
pub use poller::Poller;
pub use settlement::{
    SettlementDesk, SettlementKind, SettlementOutcome, SettlementRequest, SettlementSettings,
};

/// External systems the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn DeviceTransport>,
    pub market: Arc<dyn MarketFeed>,
    pub payment: Arc<dyn PaymentRail>,
}

impl Collaborators {
    /// HTTP-backed collaborators built from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_millis(config.station.request_timeout_ms))?;
        let market = HttpMarketFeed::new(
            &config.market.base_url,
            Duration::from_millis(config.market.request_timeout_ms),
        )?;
        Ok(Self {
            transport: Arc::new(transport),
            market: Arc::new(market),
            payment: rail_from_config(&config.payment)?,
        })
    }
}

/// What `/start` did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeStart {
    pub started: bool,
    /// Station balance used as the budget, in cents
    pub budget: f64,
    pub price: Option<f64>,
    pub cable_state: CableState,
    pub detail: String,
}

/// What `/stop` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopAction {
    /// The active controller was asked to stop and will send the command
    Signalled,
    /// No controller was active; the stop command was sent directly
    CommandSent,
}

struct TaskHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TaskHandle {
    fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

pub struct ChargingEngine {
    config: Config,
    poller: Arc<Poller>,
    commands: Arc<CommandIssuer>,
    controller: Arc<ChargeController>,
    pricing: Arc<PricingService>,
    payment: Arc<dyn PaymentRail>,
    settlement: Arc<SettlementDesk>,
    events: broadcast::Sender<SessionEvent>,
    monitor: StationMonitor,
    monitors: DashMap<String, TaskHandle>,
    controllers: DashMap<String, TaskHandle>,
    logger: StructuredLogger,
}

impl ChargingEngine {
    /// Assemble the engine. Must be called inside a Tokio runtime.
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let cache = Arc::new(SessionCache::new());
        let poller = Arc::new(Poller::new(
            cache,
            TelemetryFetcher::new(collaborators.transport.clone()),
            config.poller.clone(),
        ));
        let commands = Arc::new(CommandIssuer::new(collaborators.transport));
        let controller = Arc::new(ChargeController::new(
            poller.clone(),
            commands.clone(),
            config.controller.clone(),
        ));
        let pricing = Arc::new(PricingService::new(collaborators.market, &config.market));
        let settlement = Arc::new(SettlementDesk::start(
            collaborators.payment.clone(),
            pricing.clone(),
            SettlementSettings {
                operator_account: config.payment.operator_account.clone(),
                dust_threshold: config.payment.dust_threshold,
            },
        ));
        let (events, _) = broadcast::channel(256);
        let monitor = StationMonitor::new(
            poller.clone(),
            settlement.clone(),
            events.clone(),
            config.monitor.interval(),
        );

        Self {
            config,
            poller,
            commands,
            controller,
            pricing,
            payment: collaborators.payment,
            settlement,
            events,
            monitor,
            monitors: DashMap::new(),
            controllers: DashMap::new(),
            logger: get_logger("engine"),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        self.poller.cache()
    }

    /// Endpoint for a station reached at `base_url`
    pub fn endpoint(&self, station_id: &str, base_url: &str) -> Result<StationEndpoint> {
        StationEndpoint::new(station_id, base_url, &self.config.station.service_path)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_settlements(&self) -> broadcast::Receiver<SettlementOutcome> {
        self.settlement.subscribe()
    }

    /// Start monitors for every station listed in configuration
    pub fn start_configured_monitors(&self) {
        for entry in &self.config.monitor.stations {
            match self.endpoint(&entry.id, &entry.url) {
                Ok(endpoint) => {
                    self.ensure_monitor(&endpoint);
                }
                Err(e) => self
                    .logger
                    .error(&format!("Skipping station {}: {}", entry.id, e)),
            }
        }
    }

    /// Start the reconciliation loop for `endpoint` unless one is running.
    /// Returns whether a loop was started.
    pub fn ensure_monitor(&self, endpoint: &StationEndpoint) -> bool {
        match self.monitors.entry(endpoint.id.clone()) {
            Entry::Occupied(entry) if entry.get().is_active() => false,
            Entry::Occupied(mut entry) => {
                entry.insert(self.spawn_monitor(endpoint));
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_monitor(endpoint));
                true
            }
        }
    }

    fn spawn_monitor(&self, endpoint: &StationEndpoint) -> TaskHandle {
        let (stop, stop_rx) = watch::channel(false);
        let monitor = self.monitor.clone();
        let endpoint = endpoint.clone();
        let task = tokio::spawn(async move { monitor.run(endpoint, stop_rx).await });
        TaskHandle { stop, task }
    }

    pub fn is_monitoring(&self, station_id: &str) -> bool {
        self.monitors
            .get(station_id)
            .is_some_and(|h| h.is_active())
    }

    pub fn is_charging(&self, station_id: &str) -> bool {
        self.controllers
            .get(station_id)
            .is_some_and(|h| h.is_active())
    }

    /// Status of one station. Never fails: unavailable collaborators yield
    /// fallbacks and an unreadable station yields its last known snapshot.
    pub async fn status(&self, endpoint: &StationEndpoint) -> StatusReport {
        let (price, co2, balance, reconciled) = tokio::join!(
            self.pricing.price(),
            self.pricing.co2(),
            self.balance_or_none(&endpoint.id),
            self.poller.reconcile(endpoint),
        );

        let (snapshot, stale) = match reconciled {
            Ok(snapshot) => (snapshot, false),
            Err(e) => {
                self.logger.warn(&format!(
                    "Status for {} served from cache: {}",
                    endpoint.id, e
                ));
                (self.cache().get(&endpoint.id), true)
            }
        };

        StatusReport {
            station_id: endpoint.id.clone(),
            co2,
            price,
            balance,
            age: self.cache().age(&endpoint.id),
            snapshot,
            charging: self.is_charging(&endpoint.id),
            stale,
        }
    }

    async fn balance_or_none(&self, account: &str) -> Option<f64> {
        match self.payment.get_balance(account).await {
            Ok(b) => Some(b),
            Err(e) => {
                self.logger
                    .warn(&format!("Balance of {} unavailable: {}", account, e));
                None
            }
        }
    }

    /// Begin a budget-metered charge run funded by the station's balance.
    ///
    /// Unspent budget is refunded to `return_account` when the run ends.
    pub async fn start_charging(
        &self,
        endpoint: &StationEndpoint,
        return_account: Option<String>,
    ) -> Result<ChargeStart> {
        if self.is_charging(&endpoint.id) {
            return Err(ChargeGateError::conflict(format!(
                "a charge run is already active on {}",
                endpoint.id
            )));
        }

        let budget = self.payment.get_balance(&endpoint.id).await?;
        let snapshot = self.poller.reconcile(endpoint).await?;
        self.ensure_monitor(endpoint);

        let not_started = |detail: &str| ChargeStart {
            started: false,
            budget,
            price: None,
            cable_state: snapshot.cable_state,
            detail: detail.to_string(),
        };
        if !snapshot.cable_state.is_connected() {
            return Ok(not_started("no vehicle connected"));
        }
        if budget <= 0.0 {
            return Ok(not_started("station balance is empty"));
        }

        let price = self.pricing.price().await;

        match self.controllers.entry(endpoint.id.clone()) {
            Entry::Occupied(entry) if entry.get().is_active() => {
                return Err(ChargeGateError::conflict(format!(
                    "a charge run is already active on {}",
                    endpoint.id
                )));
            }
            Entry::Occupied(mut entry) => {
                entry.insert(self.spawn_controller(endpoint, price, budget, return_account));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_controller(endpoint, price, budget, return_account));
            }
        }

        self.logger.info(&format!(
            "Charge run started on {}: budget {:.2}, price {:.2}",
            endpoint.id, budget, price
        ));
        Ok(ChargeStart {
            started: true,
            budget,
            price: Some(price),
            cable_state: snapshot.cable_state,
            detail: "charging".to_string(),
        })
    }

    fn spawn_controller(
        &self,
        endpoint: &StationEndpoint,
        price: f64,
        budget: f64,
        return_account: Option<String>,
    ) -> TaskHandle {
        let (stop, stop_rx) = watch::channel(false);
        let controller = self.controller.clone();
        let settlement = self.settlement.clone();
        let events = self.events.clone();
        let logger = self.logger.for_station(&endpoint.id);
        let endpoint = endpoint.clone();

        let task = tokio::spawn(async move {
            let _ = events.send(SessionEvent::ChargeStarted {
                station_id: endpoint.id.clone(),
                budget,
                price,
            });
            let outcome = match controller.run(&endpoint, price, budget, stop_rx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    logger.error(&format!("Charge run rejected: {}", e));
                    return;
                }
            };
            if let Some(to) = return_account
                && outcome.refundable() > 0.0
            {
                let request = SettlementRequest::Refund {
                    station_id: endpoint.id.clone(),
                    to,
                    amount: outcome.refundable(),
                };
                if let Err(e) = settlement.submit(request) {
                    logger.error(&format!("Could not queue refund: {}", e));
                }
            }
            let _ = events.send(SessionEvent::ChargeFinished {
                station_id: endpoint.id.clone(),
                outcome,
            });
        });
        TaskHandle { stop, task }
    }

    /// Stop charging: signal the active run, or command the station directly
    pub async fn stop_charging(&self, endpoint: &StationEndpoint) -> Result<StopAction> {
        let signalled = self
            .controllers
            .get(&endpoint.id)
            .filter(|h| h.is_active())
            .map(|h| h.stop.send(true).is_ok())
            .unwrap_or(false);
        if signalled {
            self.logger
                .info(&format!("Stop requested for active run on {}", endpoint.id));
            return Ok(StopAction::Signalled);
        }
        self.commands.set_charging(endpoint, false).await?;
        Ok(StopAction::CommandSent)
    }

    pub async fn set_current_limit(&self, endpoint: &StationEndpoint, amps: u32) -> Result<()> {
        self.commands.set_current_limit(endpoint, amps).await
    }

    /// Stop every controller and monitor, then drain pending settlements
    pub async fn shutdown(&self) {
        self.logger.info("Shutting down charging engine");
        let controllers = drain_handles(&self.controllers);
        for task in controllers {
            let _ = task.await;
        }
        let monitors = drain_handles(&self.monitors);
        for task in monitors {
            let _ = task.await;
        }
        self.settlement.shutdown().await;
        self.logger.info("Charging engine stopped");
    }
}

/// Signal and remove every handle, returning the tasks to await
fn drain_handles(handles: &DashMap<String, TaskHandle>) -> Vec<JoinHandle<()>> {
    let keys: Vec<String> = handles.iter().map(|e| e.key().clone()).collect();
    keys.into_iter()
        .filter_map(|key| handles.remove(&key))
        .map(|(_, handle)| {
            let _ = handle.stop.send(true);
            handle.task
        })
        .collect()
}
