#![allow(dead_code)]

use chargegate::config::Config;
use chargegate::engine::{ChargingEngine, Collaborators};
use chargegate::error::{ChargeGateError, Result};
use chargegate::market::MarketFeed;
use chargegate::payment::{DryRunPaymentRail, PaymentRail};
use chargegate::station::{DeviceResponse, DeviceTransport, StationEndpoint};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "http://10.0.0.20:8080";

pub fn endpoint(id: &str) -> StationEndpoint {
    StationEndpoint::new(id, BASE_URL, chargegate::config::DEFAULT_SERVICE_PATH).unwrap()
}

fn measurement(value: f64) -> String {
    format!(
        "\n<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><compositeMeasurement><timestampMicros>1527503513539000</timestampMicros><quality>0</quality><value>{}</value></compositeMeasurement>\n",
        value
    )
}

fn vehicle_state(code: i64) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><evState><status><timestampMicros>1527777152065000</timestampMicros><quality>0</quality><status>{}</status></status></evState>",
        code
    )
}

#[derive(Debug)]
struct StationState {
    energy_kwh: f64,
    /// Added to the energy counter after every energy read
    energy_step_kwh: f64,
    power: String,
    cable_code: i64,
    /// Vehicle-state reads that fail before reads succeed again
    failures_left: u32,
    fail_always: bool,
    put_status: u16,
    fetches: u32,
    puts: Vec<String>,
    latency: Duration,
}

/// Scriptable station speaking the device XML dialect
#[derive(Clone)]
pub struct FakeStation {
    state: Arc<Mutex<StationState>>,
}

impl FakeStation {
    pub fn new(energy_kwh: f64, power_kw: f64, cable_code: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(StationState {
                energy_kwh,
                energy_step_kwh: 0.0,
                power: power_kw.to_string(),
                cable_code,
                failures_left: 0,
                fail_always: false,
                put_status: 200,
                fetches: 0,
                puts: Vec::new(),
                latency: Duration::ZERO,
            })),
        }
    }

    pub fn with_energy_step(self, step_kwh: f64) -> Self {
        self.state.lock().unwrap().energy_step_kwh = step_kwh;
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().unwrap().latency = latency;
        self
    }

    pub fn set_power(&self, power_kw: f64) {
        self.state.lock().unwrap().power = power_kw.to_string();
    }

    pub fn set_raw_power(&self, text: &str) {
        self.state.lock().unwrap().power = text.to_string();
    }

    pub fn set_energy(&self, energy_kwh: f64) {
        self.state.lock().unwrap().energy_kwh = energy_kwh;
    }

    pub fn set_cable(&self, code: i64) {
        self.state.lock().unwrap().cable_code = code;
    }

    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap().failures_left = count;
    }

    pub fn fail_always(&self, on: bool) {
        self.state.lock().unwrap().fail_always = on;
    }

    pub fn set_put_status(&self, status: u16) {
        self.state.lock().unwrap().put_status = status;
    }

    /// Number of fetch attempts (vehicle-state reads) seen so far
    pub fn fetches(&self) -> u32 {
        self.state.lock().unwrap().fetches
    }

    /// Operations written so far, e.g. `enableCharging/false`
    pub fn puts(&self) -> Vec<String> {
        self.state.lock().unwrap().puts.clone()
    }
}

#[async_trait::async_trait]
impl DeviceTransport for FakeStation {
    async fn get(&self, url: &str) -> Result<DeviceResponse> {
        let latency = self.state.lock().unwrap().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut s = self.state.lock().unwrap();
        if url.ends_with("/getActiveEnergyImport") {
            let body = measurement(s.energy_kwh);
            s.energy_kwh += s.energy_step_kwh;
            Ok(DeviceResponse::new(200, body))
        } else if url.ends_with("/getACActivePower") {
            Ok(DeviceResponse::new(
                200,
                format!("<compositeMeasurement><value>{}</value></compositeMeasurement>", s.power),
            ))
        } else if url.ends_with("/getCurrentVehicleState") {
            s.fetches += 1;
            if s.fail_always {
                return Err(ChargeGateError::transport("connection refused"));
            }
            if s.failures_left > 0 {
                s.failures_left -= 1;
                return Ok(DeviceResponse::new(503, "busy"));
            }
            Ok(DeviceResponse::new(200, vehicle_state(s.cable_code)))
        } else {
            Ok(DeviceResponse::new(404, "not found"))
        }
    }

    async fn put(&self, url: &str) -> Result<DeviceResponse> {
        let mut s = self.state.lock().unwrap();
        let operation = url
            .split("/Toppen_EVSE/")
            .nth(1)
            .unwrap_or(url)
            .to_string();
        s.puts.push(operation);
        Ok(DeviceResponse::new(s.put_status, "ok"))
    }
}

/// Market feed with fixed answers; `None` fails the lookup
pub struct FakeMarket {
    pub price: Option<f64>,
    pub co2: Option<f64>,
}

#[async_trait::async_trait]
impl MarketFeed for FakeMarket {
    async fn price(&self) -> Result<f64> {
        self.price
            .ok_or_else(|| ChargeGateError::transport("market offline"))
    }

    async fn co2(&self) -> Result<f64> {
        self.co2.ok_or_else(|| ChargeGateError::transport("market offline"))
    }
}

/// Payment rail whose every call fails
pub struct BrokenRail;

#[async_trait::async_trait]
impl PaymentRail for BrokenRail {
    async fn get_balance(&self, account: &str) -> Result<f64> {
        Err(ChargeGateError::payment(format!("no route to {}", account)))
    }

    async fn pay_out(&self, _from: &str, _to: &str, _amount: f64) -> Result<()> {
        Err(ChargeGateError::payment("gateway rejected transfer"))
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.payment.operator_account = "operator".to_string();
    config
}

pub fn engine_with(
    config: Config,
    station: &FakeStation,
    market: FakeMarket,
    payment: Arc<dyn PaymentRail>,
) -> ChargingEngine {
    ChargingEngine::new(
        config,
        Collaborators {
            transport: Arc::new(station.clone()),
            market: Arc::new(market),
            payment,
        },
    )
}

pub fn dry_run_rail(balances: &[(&str, f64)]) -> Arc<DryRunPaymentRail> {
    let rail = DryRunPaymentRail::new(0.0);
    for (account, balance) in balances {
        rail.set_balance(account, *balance);
    }
    Arc::new(rail)
}
