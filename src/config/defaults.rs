use super::*;

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            service_path: DEFAULT_SERVICE_PATH.to_string(),
            request_timeout_ms: 5000,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 5.0,
            max_attempts: 3,
            retry_delay_ms: 5000,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_cycle_secs: 5.0,
            idle_power_threshold_kw: 0.1,
            idle_cycles_before_stop: 12,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5.0,
            stations: Vec::new(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            fallback_price: 200.0,
            fallback_co2: None,
            request_timeout_ms: 5000,
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mode: PaymentMode::DryRun,
            gateway_url: String::new(),
            operator_account: "operator".to_string(),
            dust_threshold: 1.0,
            dry_run_balance: 0.0,
            request_timeout_ms: 10000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/chargegate.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station: StationConfig::default(),
            poller: PollerConfig::default(),
            controller: ControllerConfig::default(),
            monitor: MonitorConfig::default(),
            market: MarketConfig::default(),
            payment: PaymentConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
        }
    }
}
