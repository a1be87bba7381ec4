//! Single-flight recovery monitor.
//!
//! # States
//! ```text
//! Idle → Probing → (no errors) → Idle
//!                → (errors)    → Unhealthy → sleep(interval) → Probing
//! ```
//!
//! # Design Decisions
//! - A counter gates entry: only the trigger that moves it off zero runs
//!   the loop, every other trigger is logged and dropped
//! - The loop resets the gate when it exits, so the next failure starts a
//!   fresh loop
//! - Shutdown interrupts the sleep, not an in-flight probe

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::health::inspector::HealthInspector;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Idle,
    Probing,
    Unhealthy,
}

impl MonitorState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => MonitorState::Probing,
            2 => MonitorState::Unhealthy,
            _ => MonitorState::Idle,
        }
    }
}

pub struct HealthMonitor {
    inspector: Arc<dyn HealthInspector>,
    interval: Duration,
    gate: AtomicU64,
    state: AtomicU8,
    probes: AtomicU64,
    shutdown: Shutdown,
}

impl HealthMonitor {
    pub fn new(inspector: Arc<dyn HealthInspector>, interval: Duration, shutdown: Shutdown) -> Self {
        Self {
            inspector,
            interval,
            gate: AtomicU64::new(0),
            state: AtomicU8::new(MonitorState::Idle as u8),
            probes: AtomicU64::new(0),
            shutdown,
        }
    }

    pub fn inspector(&self) -> &Arc<dyn HealthInspector> {
        &self.inspector
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// False only while a probe has reported errors and recovery is pending.
    pub fn is_healthy(&self) -> bool {
        self.state() != MonitorState::Unhealthy
    }

    /// Whether a probe loop currently holds the gate.
    pub fn is_running(&self) -> bool {
        self.gate.load(Ordering::SeqCst) != 0
    }

    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }

    /// Start the probe loop unless one is already running. Returns whether
    /// this call started it.
    pub fn trigger(self: &Arc<Self>) -> bool {
        if self.gate.fetch_add(1, Ordering::SeqCst) != 0 {
            tracing::debug!(state = ?self.state(), "Health probe already running, trigger skipped");
            return false;
        }
        tracing::warn!("I/O failure observed, starting health probe");
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run().await });
        true
    }

    async fn run(&self) {
        loop {
            self.set_state(MonitorState::Probing);
            let errors = self.inspector.ping(true).await;
            self.probes.fetch_add(1, Ordering::SeqCst);
            metrics::record_health_probe(errors.is_empty());

            if errors.is_empty() {
                tracing::info!(probes = self.probes(), "Health probe passed, monitor idle");
                break;
            }

            self.set_state(MonitorState::Unhealthy);
            tracing::warn!(
                errors = errors.len(),
                first = %errors[0].message,
                retry_in_ms = self.interval.as_millis() as u64,
                "Health probe failed"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.wait() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
        self.set_state(MonitorState::Idle);
        self.gate.store(0, Ordering::SeqCst);
    }

    fn set_state(&self, state: MonitorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}
