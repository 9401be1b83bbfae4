mod support;

use chargegate::config::{ControllerConfig, PollerConfig};
use chargegate::engine::{ChargeController, ChargeOutcome, Poller, SessionCache, StopReason};
use chargegate::error::ChargeGateError;
use chargegate::station::{CommandIssuer, TelemetryFetcher};
use std::sync::Arc;
use std::time::Duration;
use support::{FakeStation, endpoint};
use tokio::sync::watch;

const PRICE: f64 = 200.0;

/// Energy a 7 kW draw adds over one 5 s cycle
const STEP_7KW_5S: f64 = 7.0 * 5.0 / 3600.0;

fn controller_for(station: &FakeStation, policy: ControllerConfig) -> ChargeController {
    let transport = Arc::new(station.clone());
    let poller = Arc::new(Poller::new(
        Arc::new(SessionCache::new()),
        TelemetryFetcher::new(transport.clone()),
        PollerConfig::default(),
    ));
    ChargeController::new(poller, Arc::new(CommandIssuer::new(transport)), policy)
}

async fn run_until(
    station: &FakeStation,
    policy: ControllerConfig,
    budget: f64,
    stop_after: Option<Duration>,
) -> ChargeOutcome {
    let controller = controller_for(station, policy);
    let (stop, stop_rx) = watch::channel(false);
    let run = tokio::spawn(async move {
        controller
            .run(&endpoint("st-1"), PRICE, budget, stop_rx)
            .await
    });
    if let Some(after) = stop_after {
        tokio::time::sleep(after).await;
        stop.send(true).unwrap();
    }
    run.await.unwrap().unwrap()
}

#[tokio::test(start_paused = true)]
async fn stop_request_ends_run_after_metering_one_cycle() {
    let station = FakeStation::new(100.0, 7.0, 3).with_energy_step(STEP_7KW_5S);

    let outcome = run_until(
        &station,
        ControllerConfig::default(),
        1000.0,
        Some(Duration::from_secs(7)),
    )
    .await;

    assert_eq!(outcome.reason, StopReason::StopRequested);
    assert_eq!(outcome.run_id.len(), 36);
    assert!((outcome.remaining_budget - 998.0556).abs() < 1e-3);
    assert!((outcome.metered_kwh - STEP_7KW_5S).abs() < 1e-9);
    assert!(outcome.stop_command_error.is_none());
    // Already drawing, so no start command
    assert_eq!(station.puts(), vec!["enableCharging/false".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn idle_station_is_started_and_budget_is_untouched() {
    let station = FakeStation::new(100.0, 0.0, 3);

    let outcome = run_until(
        &station,
        ControllerConfig::default(),
        500.0,
        Some(Duration::from_secs(12)),
    )
    .await;

    assert_eq!(outcome.reason, StopReason::StopRequested);
    assert_eq!(outcome.remaining_budget, 500.0);
    assert_eq!(outcome.metered_kwh, 0.0);
    assert_eq!(
        station.puts(),
        vec![
            "enableCharging/true".to_string(),
            "enableCharging/false".to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_stops_the_station() {
    let station = FakeStation::new(100.0, 7.0, 3).with_energy_step(0.01);

    let started = tokio::time::Instant::now();
    let outcome = run_until(&station, ControllerConfig::default(), 1.0, None).await;

    assert_eq!(outcome.reason, StopReason::BudgetExhausted);
    assert!(outcome.remaining_budget < 0.0);
    assert_eq!(outcome.refundable(), 0.0);
    // One budget-sized cycle of ~2.57 s instead of the full 5 s
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(station.puts().last().map(String::as_str), Some("enableCharging/false"));
}

#[tokio::test(start_paused = true)]
async fn draw_ending_stops_after_idle_cycles() {
    let station = FakeStation::new(100.0, 7.0, 3).with_energy_step(STEP_7KW_5S);
    let policy = ControllerConfig {
        idle_cycles_before_stop: 2,
        ..ControllerConfig::default()
    };

    let controller = controller_for(&station, policy);
    let (_stop, stop_rx) = watch::channel(false);
    let run = tokio::spawn(async move {
        controller
            .run(&endpoint("st-1"), PRICE, 1000.0, stop_rx)
            .await
    });

    // The vehicle stops drawing after the first metered cycle
    tokio::time::sleep(Duration::from_secs(6)).await;
    station.set_power(0.0);

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.reason, StopReason::DrawStopped);
    assert!(outcome.remaining_budget < 1000.0);
    assert_eq!(station.puts(), vec!["enableCharging/false".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn poll_failure_mid_run_still_sends_stop() {
    let station = FakeStation::new(100.0, 7.0, 3);

    let controller = controller_for(&station, ControllerConfig::default());
    let (_stop, stop_rx) = watch::channel(false);
    let run = tokio::spawn(async move {
        controller
            .run(&endpoint("st-1"), PRICE, 1000.0, stop_rx)
            .await
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    station.fail_always(true);

    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(outcome.reason, StopReason::PollFailed(_)));
    assert_eq!(outcome.remaining_budget, 1000.0);
    assert_eq!(station.puts(), vec!["enableCharging/false".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn unreadable_station_never_starts() {
    let station = FakeStation::new(100.0, 0.0, 3);
    station.fail_always(true);

    let outcome = run_until(&station, ControllerConfig::default(), 1000.0, None).await;

    assert!(matches!(outcome.reason, StopReason::PollFailed(_)));
    assert_eq!(station.puts(), vec!["enableCharging/false".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn failed_stop_command_is_reported() {
    let station = FakeStation::new(100.0, 7.0, 3).with_energy_step(0.01);
    station.set_put_status(500);

    let outcome = run_until(&station, ControllerConfig::default(), 1.0, None).await;

    assert_eq!(outcome.reason, StopReason::BudgetExhausted);
    let error = outcome.stop_command_error.expect("stop failure recorded");
    assert!(error.contains("enableCharging/false"));
}

#[tokio::test(start_paused = true)]
async fn failed_start_command_ends_the_run() {
    let station = FakeStation::new(100.0, 0.0, 3);
    station.set_put_status(503);

    let outcome = run_until(&station, ControllerConfig::default(), 1000.0, None).await;

    assert!(matches!(outcome.reason, StopReason::StartFailed(_)));
    assert!(outcome.stop_command_error.is_some());
}

#[tokio::test]
async fn non_positive_price_is_rejected_before_io() {
    let station = FakeStation::new(100.0, 7.0, 3);
    let controller = controller_for(&station, ControllerConfig::default());
    let (_stop, stop_rx) = watch::channel(false);

    let err = controller
        .run(&endpoint("st-1"), 0.0, 1000.0, stop_rx)
        .await
        .unwrap_err();

    assert!(matches!(err, ChargeGateError::Validation { .. }));
    assert_eq!(station.fetches(), 0);
    assert!(station.puts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_request_interrupts_refresh_retries() {
    let station = FakeStation::new(100.0, 7.0, 3).with_energy_step(STEP_7KW_5S);
    let controller = controller_for(&station, ControllerConfig::default());
    let (stop, stop_rx) = watch::channel(false);
    let run = tokio::spawn(async move {
        controller
            .run(&endpoint("st-1"), PRICE, 1000.0, stop_rx)
            .await
    });

    // The t=5s refresh fails and backs off until t=10s
    tokio::time::sleep(Duration::from_secs(4)).await;
    station.fail_next(2);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let requested = tokio::time::Instant::now();
    stop.send(true).unwrap();
    let outcome = run.await.unwrap().unwrap();

    assert!(requested.elapsed() < Duration::from_secs(1));
    assert_eq!(outcome.reason, StopReason::StopRequested);
    assert_eq!(outcome.remaining_budget, 1000.0);
    assert_eq!(station.puts(), vec!["enableCharging/false".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn infinite_power_reading_is_not_billed() {
    let station = FakeStation::new(100.0, 7.0, 3);
    let controller = controller_for(&station, ControllerConfig::default());
    let (_stop, stop_rx) = watch::channel(false);
    let run = tokio::spawn(async move {
        controller
            .run(&endpoint("st-1"), PRICE, 1000.0, stop_rx)
            .await
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    station.set_raw_power("inf");

    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(outcome.reason, StopReason::PollFailed(_)));
    assert_eq!(outcome.remaining_budget, 1000.0);
    assert_eq!(outcome.metered_kwh, 0.0);
}
