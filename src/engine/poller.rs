use super::cache::SessionCache;
use crate::config::PollerConfig;
use crate::error::{ChargeGateError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::station::{StationEndpoint, StationSnapshot, TelemetryFetcher};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Keeps cached snapshots within the staleness threshold.
///
/// At most one fetch per station is in flight. Callers that find a station
/// stale queue on its guard and re-check freshness once they hold it, so a
/// second caller reuses the first caller's result.
pub struct Poller {
    cache: Arc<SessionCache>,
    fetcher: TelemetryFetcher,
    policy: PollerConfig,
    guards: DashMap<String, Arc<Mutex<()>>>,
    logger: StructuredLogger,
}

impl Poller {
    pub fn new(cache: Arc<SessionCache>, fetcher: TelemetryFetcher, policy: PollerConfig) -> Self {
        Self {
            cache,
            fetcher,
            policy,
            guards: DashMap::new(),
            logger: get_logger("poller"),
        }
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Snapshot no older than the configured staleness threshold
    pub async fn reconcile(&self, endpoint: &StationEndpoint) -> Result<StationSnapshot> {
        self.reconcile_within(endpoint, self.policy.staleness()).await
    }

    /// Snapshot read from the device after this call began
    pub async fn refresh(&self, endpoint: &StationEndpoint) -> Result<StationSnapshot> {
        self.reconcile_within(endpoint, Duration::ZERO).await
    }

    /// Snapshot no older than `max_age`, fetching with retries when needed.
    ///
    /// On failure the cache is left untouched and the last error is returned.
    pub async fn reconcile_within(
        &self,
        endpoint: &StationEndpoint,
        max_age: Duration,
    ) -> Result<StationSnapshot> {
        if let Some(snapshot) = self.cache.fresh(&endpoint.id, max_age) {
            return Ok(snapshot);
        }

        let guard = self.guard_for(&endpoint.id);
        let _in_flight = guard.lock().await;

        if let Some(snapshot) = self.cache.fresh(&endpoint.id, max_age) {
            self.logger.trace(&format!(
                "Station {}: refreshed by a concurrent caller",
                endpoint.id
            ));
            return Ok(snapshot);
        }

        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.fetch_validated(endpoint).await {
                Ok(snapshot) => {
                    self.check_energy_monotonic(&endpoint.id, &snapshot);
                    self.cache.put(&endpoint.id, snapshot.clone());
                    return Ok(snapshot);
                }
                Err(e) => {
                    let remaining = if e.is_retryable() { attempts - attempt } else { 0 };
                    if remaining > 0 {
                        self.logger.warn(&format!(
                            "Station {}: refresh failed ({} retries left), retrying in {:?}: {}",
                            endpoint.id,
                            remaining,
                            self.policy.retry_delay(),
                            e
                        ));
                        tokio::time::sleep(self.policy.retry_delay()).await;
                    } else {
                        self.logger.error(&format!(
                            "Station {}: refresh failed after {} attempt(s), serving stale data: {}",
                            endpoint.id, attempt, e
                        ));
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ChargeGateError::transport("no fetch attempted")))
    }

    async fn fetch_validated(&self, endpoint: &StationEndpoint) -> Result<StationSnapshot> {
        let snapshot = self.fetcher.fetch(endpoint).await?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn check_energy_monotonic(&self, station_id: &str, snapshot: &StationSnapshot) {
        let previous = self.cache.get(station_id);
        if let (Some(before), Some(after)) = (previous.energy_total_kwh, snapshot.energy_total_kwh)
            && after < before
        {
            self.logger.warn(&format!(
                "Station {}: energy counter went backwards ({} -> {} kWh)",
                station_id, before, after
            ));
        }
    }

    fn guard_for(&self, station_id: &str) -> Arc<Mutex<()>> {
        self.guards
            .entry(station_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
