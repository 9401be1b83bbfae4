use super::detector::{SessionLifecycle, detect};
use super::events::SessionEvent;
use super::poller::Poller;
use super::settlement::{SettlementDesk, SettlementRequest};
use crate::logging::{StructuredLogger, get_logger};
use crate::station::StationEndpoint;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Per-station reconciliation loop: poll, detect, dispatch, sleep.
#[derive(Clone)]
pub struct StationMonitor {
    poller: Arc<Poller>,
    settlement: Arc<SettlementDesk>,
    events: broadcast::Sender<SessionEvent>,
    interval: Duration,
    logger: StructuredLogger,
}

impl StationMonitor {
    pub fn new(
        poller: Arc<Poller>,
        settlement: Arc<SettlementDesk>,
        events: broadcast::Sender<SessionEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            poller,
            settlement,
            events,
            interval,
            logger: get_logger("monitor"),
        }
    }

    /// Run until `stop` turns true or its sender is dropped
    pub async fn run(&self, endpoint: StationEndpoint, mut stop: watch::Receiver<bool>) {
        let logger = self.logger.for_station(&endpoint.id);
        logger.info(&format!("Monitoring {}", endpoint.service_url()));

        let mut lifecycle = SessionLifecycle::default();
        let mut previous = self.poller.cache().get(&endpoint.id);

        loop {
            if *stop.borrow() {
                break;
            }

            match self.poller.reconcile(&endpoint).await {
                Ok(current) => {
                    if current.cable_state != previous.cable_state {
                        logger.info(&format!(
                            "Cable change {:?} -> {:?}",
                            previous.cable_state, current.cable_state
                        ));
                    }
                    let (next, events) = detect(&endpoint.id, &previous, &current, lifecycle);
                    lifecycle = next;
                    for event in events {
                        self.dispatch(event, &logger);
                    }
                    previous = current;
                }
                Err(e) => logger.warn(&format!("Stale data, reconcile failed: {}", e)),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.changed() => break,
            }
        }

        logger.info("Monitor stopped");
    }

    fn dispatch(&self, event: SessionEvent, logger: &StructuredLogger) {
        match &event {
            SessionEvent::EngineReady { .. } => logger.info("Engine ready"),
            SessionEvent::SessionEnded {
                station_id,
                start: Some(start),
                end,
            } => {
                let request = SettlementRequest::SessionCharge {
                    station_id: station_id.clone(),
                    start: start.clone(),
                    end: end.clone(),
                };
                if let Err(e) = self.settlement.submit(request) {
                    logger.error(&format!("Could not queue settlement: {}", e));
                }
            }
            SessionEvent::SessionEnded { start: None, .. } => {
                logger.warn("Session ended without a recorded start, nothing to settle");
            }
            SessionEvent::ChargeStarted { .. } | SessionEvent::ChargeFinished { .. } => {}
        }
        let _ = self.events.send(event);
    }
}
