//! Service bootstrap: validate the environment, open the store, and hold the
//! process for the transport layer.

use autocomply::config::AppConfig;
use autocomply::AppState;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = AppConfig::from_env();
    let report = config.validate();

    for warning in &report.warnings {
        log::warn!("{}", warning);
    }

    if !report.ok {
        eprintln!(
            "Environment validation failed ({}): missing {}",
            report.environment,
            report.missing_env.join(", ")
        );
        std::process::exit(1);
    }

    let port = config.port;
    let environment = config.app_env.as_str();

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "AutoComply core ready (env {}, port {}); store migrated, uploads at {}",
        environment,
        port,
        state.config.uploads_root.display()
    );

    // The HTTP frontend attaches via the library API; keep the process alive
    // until asked to stop.
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
    log::info!("Shutting down");
}
