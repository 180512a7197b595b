//! Background reaper: tick-driven expiry plus out-of-band refresh signals.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::MAX_DURATION;
use crate::error::{Error, Result};
use crate::registry::RegistryInner;

/// Source of reaper wake-ups.
///
/// Each tick reports how much lifetime the sweep should charge every
/// session. Returning `None` stops the reaper.
#[async_trait]
pub trait Ticker: Send + 'static {
    /// Wait for the next tick.
    async fn tick(&mut self) -> Option<Duration>;
}

/// Wall-clock ticker backed by [`tokio::time::Interval`].
///
/// The first tick fires one full period after creation, so a fresh session
/// always survives at least `timeout` before its first charge lands.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
    period: Duration,
}

impl IntervalTicker {
    /// Create a ticker. Must be called from within a tokio runtime.
    ///
    /// Periods longer than [`MAX_DURATION`] are clamped to it.
    pub fn new(period: Duration) -> Self {
        let period = period.min(MAX_DURATION);
        let start = Instant::now()
            .checked_add(period)
            .unwrap_or_else(Instant::now);
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<Duration> {
        self.interval.tick().await;
        Some(self.period)
    }
}

/// Ticker driven by hand through a [`TickTrigger`].
///
/// Useful when a test or an embedding wants to control exactly when
/// sweeps run, independent of any clock.
#[derive(Debug)]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    step: Duration,
    pending_ack: Option<oneshot::Sender<()>>,
}

/// Handle that fires ticks on a [`ManualTicker`].
#[derive(Debug, Clone)]
pub struct TickTrigger {
    tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

impl ManualTicker {
    /// Create a ticker that charges `step` per tick, and its trigger.
    pub fn new(step: Duration) -> (Self, TickTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ticker = Self {
            rx,
            step,
            pending_ack: None,
        };
        (ticker, TickTrigger { tx })
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> Option<Duration> {
        // The reaper only asks for another tick once the previous sweep is done.
        if let Some(ack) = self.pending_ack.take() {
            let _ = ack.send(());
        }
        let ack = self.rx.recv().await?;
        self.pending_ack = Some(ack);
        Some(self.step)
    }
}

impl TickTrigger {
    /// Fire one tick and wait until the reaper has finished the sweep.
    pub async fn tick(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx.send(ack_tx).map_err(|_| Error::ReaperStopped)?;
        ack_rx.await.map_err(|_| Error::ReaperStopped)
    }
}

/// Send side of the refresh channel.
///
/// Refreshing is fire-and-forget: the signal is queued without blocking
/// and applied by the reaper on its next wake.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl RefreshHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Ask the reaper to reset a session's lifetime to the full timeout.
    ///
    /// Unknown identifiers are ignored by the reaper.
    pub fn refresh(&self, session_id: impl Into<String>) -> Result<()> {
        self.tx
            .send(session_id.into())
            .map_err(|_| Error::ReaperStopped)
    }

    /// Check whether the reaper has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Run the reaper until cancelled, the ticker ends, or the registry is gone.
///
/// A due tick always wins over incoming refreshes, so a steady stream of
/// refresh signals cannot hold off eviction. Before sweeping, the tick
/// applies the refreshes already queued, bounded by the queue length at
/// that moment.
pub(crate) async fn run<T: Ticker>(
    registry: Weak<RegistryInner>,
    mut ticker: T,
    mut refresh_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    info!("Session reaper started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Session reaper cancelled");
                break;
            }
            tick = ticker.tick() => {
                let Some(elapsed) = tick else {
                    debug!("Ticker ended, stopping reaper");
                    break;
                };
                let Some(registry) = registry.upgrade() else {
                    debug!("Session registry dropped, stopping reaper");
                    break;
                };
                let applied = drain_queued(&registry, &mut refresh_rx);
                if applied > 0 {
                    trace!(applied, "Applied queued refreshes before sweep");
                }
                registry.sweep(elapsed);
            }
            refresh = refresh_rx.recv() => {
                let Some(session_id) = refresh else {
                    debug!("Refresh channel closed, stopping reaper");
                    break;
                };
                let Some(registry) = registry.upgrade() else {
                    debug!("Session registry dropped, stopping reaper");
                    break;
                };
                registry.refresh(&session_id);
            }
        }
    }

    info!("Session reaper stopped");
}

/// Apply at most the refreshes queued right now; later arrivals wait.
fn drain_queued(
    registry: &RegistryInner,
    refresh_rx: &mut mpsc::UnboundedReceiver<String>,
) -> usize {
    let queued = refresh_rx.len();
    let mut applied = 0;
    while applied < queued {
        let Ok(session_id) = refresh_rx.try_recv() else {
            break;
        };
        registry.refresh(&session_id);
        applied += 1;
    }
    applied
}
