//! Global load shedding driven by memory pressure.
//!
//! # Hysteresis
//! ```text
//! inactive → active:   sampled % >= threshold_high (90)
//! active   → inactive: sampled % <= threshold_low  (75)
//! between the two:     no change in either direction
//! ```
//!
//! # Design Decisions
//! - One writer (the sampling loop); request tasks read the flag with
//!   relaxed loads, a one-cycle stale read is acceptable
//! - GET requests are never shed: reads are cheap and needed to diagnose
//! - Recovery is logged, not reported as an incident

use axum::http::Method;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::admission::memory::MemorySampler;
use crate::admission::protected::is_shed_exempt;
use crate::config::SheddingConfig;
use crate::incidents::{AlertWebhook, Incident, IncidentEmitter, Severity};
use crate::observability::metrics;

/// Diagnostic view of the governor.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SheddingSnapshot {
    pub shedding_active: bool,
    pub memory_pct: f64,
    pub threshold_high: f64,
    pub threshold_low: f64,
}

pub struct LoadSheddingGovernor {
    active: AtomicBool,
    memory_pct: AtomicU64,
    config: SheddingConfig,
    incidents: IncidentEmitter,
    alert: Option<AlertWebhook>,
}

impl LoadSheddingGovernor {
    pub fn new(config: SheddingConfig, incidents: IncidentEmitter, alert: Option<AlertWebhook>) -> Self {
        Self {
            active: AtomicBool::new(false),
            memory_pct: AtomicU64::new(0f64.to_bits()),
            config,
            incidents,
            alert,
        }
    }

    /// Apply one memory sample. Returns whether shedding is active afterwards.
    pub fn observe(&self, memory_pct: f64) -> bool {
        self.memory_pct.store(memory_pct.to_bits(), Ordering::Relaxed);

        let was_active = self.active.load(Ordering::Relaxed);
        let now_active = if !was_active && memory_pct >= self.config.threshold_high {
            true
        } else if was_active && memory_pct <= self.config.threshold_low {
            false
        } else {
            was_active
        };

        if now_active != was_active {
            self.active.store(now_active, Ordering::Relaxed);
            if now_active {
                self.on_activated(memory_pct);
            } else {
                tracing::info!(memory_pct, threshold_low = self.config.threshold_low, "Load shedding deactivated");
            }
        }
        metrics::set_shedding(now_active, memory_pct);
        now_active
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn memory_pct(&self) -> f64 {
        f64::from_bits(self.memory_pct.load(Ordering::Relaxed))
    }

    /// Whether a request should be rejected with 429.
    pub fn should_shed(&self, path: &str, method: &Method) -> bool {
        if !self.is_active() {
            return false;
        }
        if method == Method::GET || is_shed_exempt(path) {
            return false;
        }
        true
    }

    pub fn snapshot(&self) -> SheddingSnapshot {
        SheddingSnapshot {
            shedding_active: self.is_active(),
            memory_pct: self.memory_pct(),
            threshold_high: self.config.threshold_high,
            threshold_low: self.config.threshold_low,
        }
    }

    /// Sample every `check_interval_secs` until shutdown.
    pub async fn run<S: MemorySampler>(self: Arc<Self>, mut sampler: S, mut shutdown: broadcast::Receiver<()>) {
        let interval = Duration::from_secs(self.config.check_interval_secs.max(1));
        tracing::info!(
            interval_secs = interval.as_secs(),
            threshold_high = self.config.threshold_high,
            threshold_low = self.config.threshold_low,
            "Load shedding governor starting"
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => match sampler.sample() {
                    Ok(pct) => {
                        self.observe(pct);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Memory sample failed, keeping current shedding state");
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Load shedding governor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn on_activated(&self, memory_pct: f64) {
        tracing::warn!(memory_pct, threshold_high = self.config.threshold_high, "Load shedding activated");
        self.incidents.emit(Incident::load_shedding_activated(memory_pct));
        if let Some(alert) = &self.alert {
            alert.fire(
                format!("Load shedding activated: memory at {:.1}%", memory_pct),
                Severity::Critical,
            );
        }
    }
}
