//! Server-wide pause switch.
//!
//! Pausing only affects `/ping`, so a load balancer drains the instance
//! while work already dispatched keeps running.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ServerStatus {
    paused: AtomicBool,
}

impl ServerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paused(&self, paused: bool) {
        let previous = self.paused.swap(paused, Ordering::SeqCst);
        if previous != paused {
            tracing::info!(paused, "Server status changed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}
