//! Background tasks, spawned once at startup.

use std::sync::Arc;

use crate::hub::Frame;
use crate::state::AppState;

/// Spawn a task that broadcasts an aggregate stats snapshot to every live
/// feed on a fixed interval, keeping passive dashboards current without
/// per-client polling.
pub fn spawn_stats_broadcaster(state: Arc<AppState>) {
    let interval = state.config.stats_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if state.hub.connection_count() == 0 {
                continue;
            }

            let stats = state.stats().await;
            state.hub.broadcast(Frame::stats(&stats));
        }
    });
}

/// Spawn a task that sweeps expired rate-limit buckets so the table stays
/// bounded under a growing address/agent space.
pub fn spawn_limiter_sweeper(state: Arc<AppState>) {
    let interval = state.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            state.limiter.cleanup().await;
        }
    });
}
