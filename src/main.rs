use anyhow::Result;
use chargegate::config::Config;
use chargegate::engine::{ChargingEngine, Collaborators};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    chargegate::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Chargegate {} starting up with {} configured station(s)",
        env!("APP_VERSION"),
        config.monitor.stations.len()
    );

    let collaborators = Collaborators::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create collaborators: {}", e))?;
    let (host, port) = (config.web.host.clone(), config.web.port);
    let engine = Arc::new(ChargingEngine::new(config, collaborators));
    engine.start_configured_monitors();

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
    };

    #[cfg(feature = "web")]
    let served = chargegate::web::serve(engine.clone(), &host, port, ctrl_c).await;
    #[cfg(not(feature = "web"))]
    let served: Result<()> = {
        let _ = (host, port);
        ctrl_c.await;
        Ok(())
    };

    engine.shutdown().await;

    match served {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Web server failed with error: {}", e);
            Err(anyhow::anyhow!("Web server error: {}", e))
        }
    }
}
