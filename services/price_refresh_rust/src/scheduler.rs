//! Wall-clock refresh schedule.
//!
//! Ticks land on multiples of the interval past the hour (xx:00, xx:20, xx:40 for the
//! default 20 minutes). Each tick runs the cycle in its own task so a panic is contained
//! and the next tick still fires.

use chrono::{DateTime, Duration, Utc};
use crafting_core::RefreshOrchestrator;
use std::sync::Arc;
use tracing::{debug, error, info};

/// First aligned tick strictly after `now`.
pub fn next_aligned_tick(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let period = interval.num_seconds().max(1);
    let next = (now.timestamp().div_euclid(period) + 1) * period;
    DateTime::<Utc>::from_timestamp(next, 0).unwrap_or(now + interval)
}

pub async fn run_refresh_schedule(
    orchestrator: Arc<RefreshOrchestrator>,
    interval_mins: u32,
    refresh_on_startup: bool,
) {
    let interval = Duration::minutes(interval_mins as i64);
    info!("Refresh schedule started (every {} minutes)", interval_mins);

    if refresh_on_startup {
        run_tick(&orchestrator).await;
    }

    loop {
        let now = Utc::now();
        let next = next_aligned_tick(now, interval);
        debug!("Next scheduled refresh at {}", next);

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        run_tick(&orchestrator).await;
    }
}

async fn run_tick(orchestrator: &Arc<RefreshOrchestrator>) {
    let orchestrator = orchestrator.clone();
    if let Err(e) = tokio::spawn(async move { orchestrator.run_scheduled().await }).await {
        error!("Scheduled refresh task aborted: {}", e);
    }
}
