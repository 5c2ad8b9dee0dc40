use async_trait::async_trait;
use herald_core::scheduler::Scheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Something that delivers due work when poked.
#[async_trait]
pub trait Tick: Send + Sync + 'static {
    /// Run one pass and return how many items were delivered.
    async fn tick(&self) -> usize;
}

#[async_trait]
impl Tick for Scheduler {
    async fn tick(&self) -> usize {
        Scheduler::tick(self).await.len()
    }
}

/// Shortest interval the loop accepts; zero would make `tokio::time::interval` panic.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime configuration for the schedule loop.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRuntimeConfig {
    /// Time between two ticks.
    pub interval: Duration,
}

impl ScheduleRuntimeConfig {
    /// Create a config ticking every `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

/// Spawn the schedule loop on the Tokio runtime.
///
/// The handle resolves to the number of items delivered once `cancel`
/// fires. A tick already in progress runs to completion first.
pub fn spawn_schedule_runtime<T: Tick>(
    ticker: Arc<T>,
    config: ScheduleRuntimeConfig,
    cancel: CancellationToken,
) -> JoinHandle<usize> {
    tokio::spawn(run_schedule_loop(ticker, config, cancel))
}

/// Tick every `config.interval` until cancelled. The first tick is immediate.
pub async fn run_schedule_loop<T: Tick>(
    ticker: Arc<T>,
    config: ScheduleRuntimeConfig,
    cancel: CancellationToken,
) -> usize {
    let mut interval = tokio::time::interval(config.interval.max(MIN_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut delivered = 0;

    info!("Schedule loop started (interval: {:?})", config.interval);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let count = ticker.tick().await;
                if count > 0 {
                    debug!("Schedule tick delivered {count} items");
                }
                delivered += count;
            }
        }
    }
    info!("Schedule loop stopped after delivering {delivered} items");
    delivered
}
