//! C4: per-session error-state tracking.
//!
//! Remembers which `(event-type, target)` pairs a session currently has an
//! active error rendered for, so the render pipeline can emit a synthetic
//! `ok`-state "clear" `DomEvent` the moment the same event later succeeds.
//! Entries expire on their own after a bounded TTL so a session that never
//! recovers doesn't hold memory forever.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Default lifetime of an error-state entry before the background sweep
/// reclaims it regardless of whether it was ever cleared.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct Entry {
    target: String,
    recorded_at: Instant,
}

type SessionErrors = HashMap<String, Entry>;
type Table = Arc<RwLock<HashMap<String, SessionErrors>>>;

/// Tracks active error targets per session, keyed by the event-type string
/// (`fir:<id>:error[::<fragment>]`).
#[derive(Clone)]
pub struct ErrorStateCache {
    table: Table,
    ttl: Duration,
}

impl ErrorStateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            table: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Records that `session_id` currently has an active error rendered at
    /// `target` for `event_type`.
    pub fn record(&self, session_id: &str, event_type: &str, target: &str) {
        let mut guard = self.table.write().expect("error cache poisoned");
        guard.entry(session_id.to_owned()).or_default().insert(
            event_type.to_owned(),
            Entry {
                target: target.to_owned(),
                recorded_at: Instant::now(),
            },
        );
    }

    /// Removes and returns the target previously recorded for
    /// `session_id`/`event_type`, if any and not yet expired. Called when
    /// the same event next renders in a non-error state, to know where to
    /// aim the synthetic clear event.
    pub fn take(&self, session_id: &str, event_type: &str) -> Option<String> {
        let mut guard = self.table.write().expect("error cache poisoned");
        let session = guard.get_mut(session_id)?;
        let entry = session.remove(event_type)?;
        if session.is_empty() {
            guard.remove(session_id);
        }
        if entry.recorded_at.elapsed() > self.ttl {
            None
        } else {
            Some(entry.target)
        }
    }

    /// Drops every entry for a session, e.g. when its socket disconnects.
    pub fn clear_session(&self, session_id: &str) {
        self.table
            .write()
            .expect("error cache poisoned")
            .remove(session_id);
    }

    fn sweep(&self) {
        let mut guard = self.table.write().expect("error cache poisoned");
        guard.retain(|_, session| {
            session.retain(|_, entry| entry.recorded_at.elapsed() <= self.ttl);
            !session.is_empty()
        });
    }

    /// Spawns a background task that periodically reclaims expired entries.
    /// The handle is owned by the caller (typically the `Route`) and aborted
    /// on drop.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                cache.sweep();
            }
        })
    }
}

impl Default for ErrorStateCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
