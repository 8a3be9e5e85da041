//! Fixed-cadence tick driver.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use contracts::RoadError;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::engine::FusionEngine;

/// Source of the acquisition clock, in the same unit as sample timestamps
pub trait TickClock: Send {
    fn now(&self) -> f64;
}

/// Seconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TickClock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Seconds since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Clock whose zero lies `offset` in the past
    pub fn starting_at(offset: Duration) -> Self {
        let now = Instant::now();
        Self {
            origin: now.checked_sub(offset).unwrap_or(now),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Run summary
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriverStats {
    pub ticks: u64,
    pub timing_faults: u64,
    pub tick_errors: u64,
    pub max_lateness_ms: f64,
}

/// Drives a [`FusionEngine`] at the configured tick rate
pub struct TickDriver<C: TickClock> {
    engine: FusionEngine,
    clock: C,
    stats: DriverStats,
}

impl<C: TickClock> TickDriver<C> {
    pub fn new(engine: FusionEngine, clock: C) -> Self {
        Self {
            engine,
            clock,
            stats: DriverStats::default(),
        }
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut FusionEngine {
        &mut self.engine
    }

    /// Tick until `shutdown` resolves
    ///
    /// Shutdown is only observed between ticks. A tick that starts more than one
    /// period after its deadline is a timing fault: reported and dropped, and the
    /// loop carries on with the next deadline.
    ///
    /// # Errors
    /// Only fatal (structural) engine errors end the loop early.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<DriverStats, RoadError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut rate_hz = self.engine.config().snapshot().tick.rate_hz;
        let mut period = Duration::from_secs_f64(1.0 / rate_hz);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(rate_hz, "tick driver started");

        loop {
            let deadline = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                deadline = ticker.tick() => deadline,
            };

            let config = self.engine.config().snapshot();
            let lateness = Instant::now().saturating_duration_since(deadline);
            self.stats.max_lateness_ms = self
                .stats
                .max_lateness_ms
                .max(lateness.as_secs_f64() * 1000.0);

            if lateness > period {
                let fault = RoadError::TimingFault {
                    lateness_ms: lateness.as_secs_f64() * 1000.0,
                    period_ms: period.as_secs_f64() * 1000.0,
                };
                warn!(error = %fault, "tick dropped");
                observability::record_timing_fault();
                self.stats.timing_faults += 1;
            } else {
                let t = self.clock.now() - config.alignment_latency_s();
                match self.engine.tick(t) {
                    Ok(_) => self.stats.ticks += 1,
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "fatal engine failure, stopping");
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(error = %e, "tick failed");
                        if matches!(e, RoadError::TimingFault { .. }) {
                            observability::record_timing_fault();
                            self.stats.timing_faults += 1;
                        }
                        self.stats.tick_errors += 1;
                    }
                }
            }

            if config.tick.rate_hz != rate_hz {
                rate_hz = config.tick.rate_hz;
                period = Duration::from_secs_f64(1.0 / rate_hz);
                ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // the fresh interval fires immediately; consume that
                ticker.tick().await;
                info!(rate_hz, "tick rate changed");
            }
        }

        info!(
            ticks = self.stats.ticks,
            timing_faults = self.stats.timing_faults,
            "tick driver stopped"
        );
        Ok(self.stats)
    }
}
