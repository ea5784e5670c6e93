//! Background job: drop pending approval entries past their TTL.
//!
//! Expired entries already count as absent for `authorize`; the sweep only
//! keeps the map from growing with requesters who never wrote again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::approval::AuthorizationGate;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the sweep task. Call this once at startup.
pub fn spawn(gate: AuthorizationGate, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = gate.sweep_expired().await;
            if removed > 0 {
                tracing::info!(removed, "expired pending approvals dropped");
            }
        }
    })
}
