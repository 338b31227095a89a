//! Fixed-interval refresh loop.
//!
//! Intervals are measured from the end of one cycle to the start of the
//! next, so a slow cycle never causes overlapping runs.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::service::HunterService;

/// Drive the service's refresh cycle until `shutdown` flips to `true` or
/// the sender is dropped.
pub async fn run(service: Arc<HunterService>, mut shutdown: watch::Receiver<bool>) {
    let interval = service.refresh_interval();
    info!(interval_secs = interval.as_secs(), "scheduler started");

    loop {
        service.refresh().await;

        let sleep = tokio::time::sleep(interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler stopping");
                        return;
                    }
                    // Spurious wake, keep waiting out the interval.
                    debug!("shutdown flag unchanged");
                }
            }
        }
    }
}
