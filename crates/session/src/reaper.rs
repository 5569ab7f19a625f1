//! Periodic sweep of idle sessions out of the registry.
//!
//! Only the in-process handle is dropped. Archive and working memory stay in
//! storage and a later `get_session_context` starts a fresh handle. Each
//! sweep also drops conversation write locks that nobody holds.

use std::sync::Arc;
use std::time::Duration;

use recall_core::ConversationLocks;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::SessionRegistry;

/// A running reaper. Dropping it leaves the sweep running; call
/// [`Reaper::stop`] to end it.
pub struct Reaper {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl Reaper {
    pub fn start(
        registry: SessionRegistry,
        locks: Arc<ConversationLocks>,
        interval: Duration,
        max_inactive: Duration,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                max_inactive_secs = max_inactive.as_secs(),
                "Session reaper started"
            );
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = sweep(&registry, max_inactive).await;
                        if removed > 0 {
                            info!(removed, "Reaped idle sessions");
                        }
                        let unlocked = locks.prune();
                        if unlocked > 0 {
                            debug!(unlocked, "Pruned idle conversation locks");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!("Session reaper stopped");
        });

        Self { handle, stop }
    }

    pub async fn stop(self) {
        self.stop.send_replace(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Session reaper ended abnormally");
        }
    }
}

/// Remove sessions idle for longer than `max_inactive`. Sessions locked by a
/// caller are in use and kept.
pub async fn sweep(registry: &SessionRegistry, max_inactive: Duration) -> usize {
    let mut sessions = registry.write().await;
    let before = sessions.len();
    sessions.retain(|session_id, ctx| match ctx.try_lock() {
        Ok(ctx) if ctx.idle_for() > max_inactive => {
            debug!(session_id = %session_id, "Dropping idle session");
            false
        }
        _ => true,
    });
    before - sessions.len()
}
