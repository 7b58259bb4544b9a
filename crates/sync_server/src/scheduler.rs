//! # Tick Scheduler
//!
//! Drives the world one turn per tick in three phases:
//!
//! 1. **Write**: registered [`TickHandler`]s run in registration order with
//!    exclusive access to the world.
//! 2. **Read**: one task per bound session builds that client's frame under a
//!    shared read lock and pushes it to the client's outbox. The tasks run
//!    concurrently and none of them mutates the world.
//! 3. **Advance**: once every read of the tick has finished, `next_turn` runs
//!    under the write lock.
//!
//! A client that has acknowledged nothing gets a FULL frame. Otherwise it gets
//! the delta since its acknowledged turn, or a FULL frame when it fell behind
//! the retained generations.

use crate::context::ServerContext;
use crate::error::ServerError;
use crate::session::{PerceptionTarget, SessionRegistry};
use crate::shutdown::ShutdownState;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use world_sync::{DetailLevel, ObjectId, SyncFrame, Turn, World, WorldError, ZoneError};

/// Game logic run during the write phase of every tick.
pub trait TickHandler: Send + Sync {
    fn name(&self) -> &str;

    fn on_tick(
        &self,
        world: &mut World,
        sessions: &SessionRegistry,
        tick: u64,
    ) -> Result<(), ServerError>;
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Frames queued for clients, FULL resyncs included
    pub frames_sent: usize,
    /// FULL frames sent to clients that had acknowledged a turn
    pub full_resyncs: usize,
    /// Frames dropped because the client's outbox was full
    pub frames_dropped: usize,
    pub perception_failures: usize,
    pub handler_failures: usize,
}

/// Totals over the lifetime of a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub frames_sent: u64,
    pub full_resyncs: u64,
    pub frames_dropped: u64,
    pub perception_failures: u64,
    pub handler_failures: u64,
}

impl SchedulerStats {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.frames_sent += report.frames_sent as u64;
        self.full_resyncs += report.full_resyncs as u64;
        self.frames_dropped += report.frames_dropped as u64;
        self.perception_failures += report.perception_failures as u64;
        self.handler_failures += report.handler_failures as u64;
    }
}

enum Delivery {
    Sent { resync: bool },
    Dropped,
    Closed,
    Failed,
}

impl TickReport {
    fn count(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Sent { resync } => {
                self.frames_sent += 1;
                if resync {
                    self.full_resyncs += 1;
                }
            }
            Delivery::Dropped => self.frames_dropped += 1,
            Delivery::Closed => {}
            Delivery::Failed => self.perception_failures += 1,
        }
    }
}

/// Frame for a client observing `object` that last acknowledged `acknowledged`.
pub fn frame_for(
    world: &World,
    object: &ObjectId,
    acknowledged: Option<Turn>,
) -> Result<SyncFrame, WorldError> {
    let Some(acked) = acknowledged else {
        return world.perception(object, DetailLevel::Full);
    };
    match world.perception_since(object, acked) {
        Err(WorldError::Zone(e)) if e.requires_full_resync() => {
            warn!("🔄 {} for {}, sending a full frame", e, object);
            world.perception(object, DetailLevel::Full)
        }
        other => other,
    }
}

fn serve(world: &World, target: PerceptionTarget) -> Delivery {
    let frame = match frame_for(world, &target.object, target.acknowledged) {
        Ok(frame) => frame,
        Err(WorldError::Zone(ZoneError::UntrackedObject(_))) => {
            debug!("👻 {} observed by client {} is gone", target.object, target.client);
            return Delivery::Failed;
        }
        Err(e) => {
            warn!("⚠️ No frame for client {}: {}", target.client, e);
            return Delivery::Failed;
        }
    };

    let resync = target.acknowledged.is_some() && frame.level() == DetailLevel::Full;
    match target.outbox.try_send(frame) {
        Ok(()) => Delivery::Sent { resync },
        Err(TrySendError::Full(frame)) => {
            warn!(
                "📪 Outbox of client {} is full, dropping frame for {}",
                target.client,
                frame.turn()
            );
            Delivery::Dropped
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Outbox of client {} is closed", target.client);
            Delivery::Closed
        }
    }
}

pub struct TickScheduler {
    context: ServerContext,
    handlers: Vec<Arc<dyn TickHandler>>,
    interval: Duration,
    ticks: u64,
}

impl TickScheduler {
    pub fn new(context: ServerContext, interval: Duration) -> Self {
        Self {
            context,
            handlers: Vec::new(),
            interval,
            ticks: 0,
        }
    }

    /// Adds a handler; handlers run in registration order.
    pub fn register(&mut self, handler: Arc<dyn TickHandler>) {
        info!("🧩 Tick handler registered: {}", handler.name());
        self.handlers.push(handler);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one complete tick.
    pub async fn tick(&mut self) -> TickReport {
        let _gate = self.context.lock_tick().await;
        let mut report = TickReport {
            tick: self.ticks,
            ..TickReport::default()
        };

        {
            let mut world = self.context.world().write().await;
            for handler in &self.handlers {
                if let Err(e) = handler.on_tick(&mut world, self.context.sessions(), report.tick) {
                    error!("❌ Tick handler {} failed on tick {}: {}", handler.name(), report.tick, e);
                    report.handler_failures += 1;
                }
            }
        }

        let reads = self
            .context
            .sessions()
            .perception_targets()
            .into_iter()
            .map(|target| {
                let world = Arc::clone(self.context.world());
                tokio::spawn(async move {
                    let world = world.read().await;
                    serve(&world, target)
                })
            });
        for outcome in join_all(reads).await {
            match outcome {
                Ok(delivery) => report.count(delivery),
                Err(e) => {
                    error!("❌ Perception task failed: {}", e);
                    report.perception_failures += 1;
                }
            }
        }

        self.context.world().write().await.next_turn();
        self.ticks += 1;
        report
    }

    /// Ticks at the configured interval until shutdown is initiated.
    ///
    /// A zero interval disables the loop.
    pub async fn run(mut self, shutdown: ShutdownState) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        if self.interval.is_zero() {
            info!("⏸️ Tick loop disabled");
            shutdown.complete_shutdown();
            return stats;
        }

        info!("⏱️ Tick loop running every {}ms", self.interval.as_millis());
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if shutdown.is_shutdown_initiated() {
                break;
            }

            let report = self.tick().await;
            if report.frames_dropped > 0 || report.handler_failures > 0 {
                debug!("Tick {} finished with issues: {:?}", report.tick, report);
            }
            stats.record(&report);
        }

        shutdown.complete_shutdown();
        stats
    }
}
