//! Main application logic and lifecycle management.
//!
//! The `Application` builds the world and its collaborators from the
//! configuration, runs the tick loop, and on shutdown stops the loop before
//! storing the objects clients were observing.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::context::ServerContext;
use crate::logging::display_banner;
use crate::scheduler::{SchedulerStats, TickHandler, TickScheduler};
use crate::session::SessionRegistry;
use crate::shutdown::ShutdownState;
use crate::signals::{shutdown_on_signal, termination_signal};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use world_sync::{FileStore, World};

/// How long the tick loop gets to finish its current tick on shutdown.
const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Main application struct.
///
/// # Architecture
///
/// * **Configuration Management**: Loads and validates configuration from files and CLI
/// * **World Orchestration**: Creates the configured zones and the object store
/// * **Tick Loop**: Runs game logic, client perception and turn advance each tick
/// * **Graceful Shutdown**: Stops the loop, then persists observed objects
pub struct Application {
    config: AppConfig,
    context: ServerContext,
    scheduler: TickScheduler,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Build the world, the object store and the tick scheduler
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        args.apply_overrides(&mut config);

        display_banner();
        Self::with_config(config)
    }

    /// Builds the application from an already loaded configuration.
    pub fn with_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        let mut world = World::new();
        for zone in &config.server.zones {
            world.add_zone(zone.as_str())?;
        }

        let store = FileStore::open(&config.storage.directory)?;
        info!("🗄️ Object store opened at {}", store.directory().display());

        let sessions = SessionRegistry::new(config.server.max_clients, config.server.outbox_capacity);
        let context = ServerContext::new(world, sessions, Arc::new(store));
        let scheduler = TickScheduler::new(
            context.clone(),
            Duration::from_millis(config.server.tick_interval_ms),
        );

        Ok(Self {
            config,
            context,
            scheduler,
        })
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Adds game logic to the write phase of every tick.
    pub fn register_handler(&mut self, handler: Arc<dyn TickHandler>) {
        self.scheduler.register(handler);
    }

    /// Runs until SIGINT or SIGTERM, then shuts down gracefully.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let shutdown = ShutdownState::new();
        let signalled = shutdown.clone();
        self.run_until(async move { shutdown_on_signal(&signalled).await }, shutdown)
            .await?;
        Ok(())
    }

    /// Runs until `stop` resolves, then shuts down gracefully.
    pub async fn run_until<F>(
        self,
        stop: F,
        shutdown: ShutdownState,
    ) -> Result<SchedulerStats, Box<dyn std::error::Error>>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        info!("🌟 Starting World Sync Server");
        self.log_configuration_summary();

        let scheduler_handle = tokio::spawn(self.scheduler.run(shutdown.clone()));

        info!("✅ World Sync Server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        stop.await?;
        if !shutdown.is_shutdown_initiated() {
            shutdown.initiate_shutdown();
        }

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = termination_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("⏳ Phase 1: Waiting for the current tick to finish...");
        let stats = match tokio::time::timeout(SCHEDULER_STOP_TIMEOUT, scheduler_handle).await {
            Ok(Ok(stats)) => {
                info!("✅ Tick loop stopped");
                stats
            }
            Ok(Err(e)) => {
                error!("❌ Tick loop failed: {:?}", e);
                SchedulerStats::default()
            }
            Err(_) => {
                warn!("⏰ Tick loop did not stop within {:?}, continuing shutdown", SCHEDULER_STOP_TIMEOUT);
                SchedulerStats::default()
            }
        };

        if self.config.storage.persist_on_shutdown {
            info!("💾 Phase 2: Storing observed objects...");
            let stored = self.context.persist_bound_objects().await;
            info!("✅ {} object(s) stored", stored);
        } else {
            info!("⏭️ Phase 2: Persistence on shutdown disabled");
        }

        log_final_statistics(&self.context, &stats).await;

        info!("✅ World Sync Server shutdown complete");
        Ok(stats)
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌍 Zones: {}", self.config.server.zones.join(", "));
        info!("  ⏱️ Tick interval: {}ms", self.config.server.tick_interval_ms);
        info!("  👥 Max clients: {}", self.config.server.max_clients);
        info!("  🗄️ Storage: {}", self.config.storage.directory);
    }
}

/// Logs final statistics during shutdown.
async fn log_final_statistics(context: &ServerContext, stats: &SchedulerStats) {
    info!("📊 Final Statistics:");
    info!("  - Ticks run: {}", stats.ticks);
    info!(
        "  - Frames sent: {} ({} full resyncs, {} dropped)",
        stats.frames_sent, stats.full_resyncs, stats.frames_dropped
    );
    info!("  - Sessions open: {}", context.sessions().len());

    let world = context.world().read().await;
    for zone in world.zones() {
        let zone_stats = zone.stats();
        info!(
            "  - Zone {} at {}: {} objects (peak {}), {} changes recorded",
            zone.id(),
            zone.turn(),
            zone.len(),
            zone_stats.peak_objects,
            zone_stats.changes_recorded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use world_sync::{stored_id, ObjectStore, WorldObject, ZONE_ATTRIBUTE};

    fn config_in(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.server.zones = vec!["harbour".to_string(), "market".to_string()];
        config.server.tick_interval_ms = 1;
        config.storage.directory = dir.path().join("objects").to_string_lossy().to_string();
        config
    }

    #[test]
    fn test_with_config_builds_zones() {
        let dir = TempDir::new().unwrap();
        let app = Application::with_config(config_in(&dir)).unwrap();

        let world = app.context().world().try_read().unwrap();
        assert!(world.has_zone(&"harbour".into()));
        assert!(world.has_zone(&"market".into()));
        assert!(dir.path().join("objects").is_dir());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.logging.level = "loud".to_string();

        let result = Application::with_config(config);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_new_creates_default_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        let storage = dir.path().join("objects");
        let args = CliArgs::try_parse_from([
            "sync_server",
            "--config",
            config_path.to_str().unwrap(),
            "--storage",
            storage.to_str().unwrap(),
        ])
        .unwrap();

        let app = Application::new(args).await.unwrap();

        assert!(config_path.exists());
        assert_eq!(app.config.storage.directory, storage.to_string_lossy());
    }

    #[tokio::test]
    async fn test_shutdown_persists_observed_objects() {
        let dir = TempDir::new().unwrap();
        let app = Application::with_config(config_in(&dir)).unwrap();
        let context = app.context().clone();

        let id = context
            .between_ticks(|world| {
                let mut player = WorldObject::new();
                player.put(ZONE_ATTRIBUTE, "harbour");
                player.put("name", "ada");
                world.add(player)
            })
            .await
            .unwrap();
        let (client, mut inbox) = context.sessions().connect().unwrap();
        context.sessions().mark_authenticated(client).unwrap();
        context.sessions().bind(client, id.clone()).unwrap();

        let stop = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        };
        let stats = app.run_until(stop, ShutdownState::new()).await.unwrap();

        assert!(stats.ticks > 0);
        assert!(inbox.try_recv().is_ok());

        let record = {
            let world = context.world().read().await;
            stored_id(world.get(&id).unwrap()).unwrap()
        };
        let stored = context.store().load_object(record).unwrap();
        assert_eq!(stored.get_str("name").unwrap(), "ada");
    }
}
