//! # World Sync Server
//!
//! Process entry point of the zone-based world server. It hosts the
//! [`world_sync`] core behind a tick loop that runs game logic, serves each
//! client its perception frame and advances the turn, in that order.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! sync_server
//!
//! # Specify custom configuration
//! sync_server --config production.toml
//!
//! # Override specific settings
//! sync_server --tick-ms 33 --storage /srv/objects --log-level debug
//!
//! # JSON logging for production
//! sync_server --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! SIGINT (Ctrl+C) and SIGTERM stop the tick loop between two ticks; the
//! objects clients were observing are then stored. A second signal exits
//! immediately.

pub mod app;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod signals;

pub use app::Application;
pub use cli::CliArgs;
pub use config::{AppConfig, LoggingSettings, ServerSettings, StorageSettings};
pub use context::ServerContext;
pub use error::ServerError;
pub use scheduler::{frame_for, SchedulerStats, TickHandler, TickReport, TickScheduler};
pub use session::{AuthenticationStatus, ClientId, ClientSession, PerceptionTarget, SessionRegistry};
pub use shutdown::ShutdownState;

/// Runs the server process.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // logging needs the configured level before anything else is logged
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    args.apply_overrides(&mut config);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                tracing::error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
