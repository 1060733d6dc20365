//! Background sweep of expired states
//!
//! One task per `MemoryStore`, ticking every `min(cleanup_interval, ttl)`.
//! The task holds only a `Weak` handle to the map: once the store is dropped
//! the next tick ends the loop. Tokio does not wait for spawned tasks at
//! shutdown, so the sweep never keeps the process alive.

use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::store::{Entries, lock};

/// Spawn the sweep on the current runtime.
///
/// Returns `None` when called outside a tokio runtime; the store then relies
/// on lazy expiry alone.
pub(crate) fn spawn_sweep_task(
    entries: Weak<Mutex<Entries>>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick, the store was just created empty
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(entries) = entries.upgrade() else {
                debug!("state store dropped, sweep exiting");
                break;
            };
            sweep_cycle(&entries);
        }
    }))
}

/// Run one sweep: drop every entry whose expiry has passed.
fn sweep_cycle(entries: &Mutex<Entries>) {
    let removed = lock(entries).purge_expired(Instant::now());
    if removed > 0 {
        debug!(removed, "swept expired states");
        crate::metrics::record_purged("sweep", removed);
    }
}
