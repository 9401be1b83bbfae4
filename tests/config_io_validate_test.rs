use chargegate::config::{Config, PaymentMode, StationEntry};
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.monitor.stations.push(StationEntry {
        id: "garage-1".to_string(),
        url: "http://10.0.0.5:8080".to_string(),
    });
    cfg.payment.operator_account = "acme-energy".to_string();
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.monitor.stations.len(), 1);
    assert_eq!(loaded.monitor.stations[0].id, "garage-1");
    assert_eq!(loaded.payment.operator_account, "acme-energy");
    assert_eq!(loaded.logging.file, cfg.logging.file);
}

#[test]
fn partial_yaml_keeps_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"poller:\n  staleness_secs: 2.5\npayment:\n  mode: http\n  gateway_url: http://gw:9000\n",
    )
    .unwrap();

    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(cfg.poller.staleness_secs, 2.5);
    assert_eq!(cfg.poller.max_attempts, 3);
    assert_eq!(cfg.payment.mode, PaymentMode::Http);
    assert_eq!(cfg.market.fallback_price, 200.0);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();
    assert!(cfg.validate().is_ok());

    // Relative service path
    cfg.station.service_path = "typebased_WS_EVSE".to_string();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.poller.max_attempts = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.poller.staleness_secs = -1.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.controller.max_cycle_secs = 0.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.market.fallback_price = 0.0;
    assert!(cfg.validate().is_err());

    // Http rail without a gateway
    cfg = Config::default();
    cfg.payment.mode = PaymentMode::Http;
    cfg.payment.gateway_url.clear();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.monitor.stations.push(StationEntry {
        id: "st-1".to_string(),
        url: " ".to_string(),
    });
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.web.port = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
