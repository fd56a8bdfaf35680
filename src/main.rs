use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drone_teleop::config::{AppConfig, LogLevel};
use drone_teleop::state::AppState;
use drone_teleop::supervisor::{report_restart, ProcessSupervisor};
use drone_teleop::utils::bind_tcp_listener;
use drone_teleop::web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();

    init_logging(config.log_level, config.verbose);

    if config.worker {
        run_worker(config).await
    } else {
        tracing::info!("Starting drone-teleop v{} supervisor", env!("CARGO_PKG_VERSION"));
        ProcessSupervisor::for_current_exe()?.run().await?;
        Ok(())
    }
}

/// Serve one operator session until the supervisor replaces this process
async fn run_worker(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        "Worker {} starting (vehicle link {})",
        std::process::id(),
        if config.use_drone { "enabled" } else { "disabled" }
    );

    let addr = config.listen_addr();
    let state = AppState::new(config);

    if let Some(rx) = state.restart.take_receiver() {
        tokio::spawn(report_restart(rx));
    }

    let listener = bind_tcp_listener(addr)
        .and_then(tokio::net::TcpListener::from_std)
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    let app = web::create_router(Arc::clone(&state));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    tracing::info!("Worker stopped");
    Ok(())
}

/// Initialize logging on stderr; stdout belongs to the supervisor protocol
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "drone_teleop=error,tower_http=error",
        LogLevel::Warn => "drone_teleop=warn,tower_http=warn",
        LogLevel::Info => "drone_teleop=info,tower_http=info",
        LogLevel::Verbose => "drone_teleop=debug,tower_http=info",
        LogLevel::Debug => "drone_teleop=debug,tower_http=debug",
        LogLevel::Trace => "drone_teleop=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
