//! Reclamation loop: periodic removal of stale session directories
//!
//! One eager pass at startup clears orphans left by a previous crash, then
//! one pass per interval until shutdown. An entry is stale when its last
//! modification is older than the threshold and no pipeline currently owns
//! it.

use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vsplit_common::duration::format_duration;

use crate::arena::{ActiveSessions, DestroyOutcome, SessionArena};

/// Counts from one reclamation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub scanned: usize,
    pub reclaimed: usize,
    pub skipped_active: usize,
    pub skipped_fresh: usize,
}

/// Time-based session garbage collector
#[derive(Debug, Clone)]
pub struct Reclaimer {
    arena: SessionArena,
    active: ActiveSessions,
    threshold: Duration,
    interval: Duration,
}

impl Reclaimer {
    pub fn new(
        arena: SessionArena,
        active: ActiveSessions,
        threshold: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            arena,
            active,
            threshold,
            interval,
        }
    }

    /// One pass, treating `now` as the current time
    ///
    /// Blocking filesystem work; call from a blocking context.
    pub fn run_pass(&self, now: SystemTime) -> ReclaimReport {
        let mut report = ReclaimReport::default();

        for entry in self.arena.list_entries() {
            report.scanned += 1;

            if self.active.contains(&entry.session_id) {
                report.skipped_active += 1;
                continue;
            }

            // A modification time in the future counts as fresh
            let age = now.duration_since(entry.modified).unwrap_or(Duration::ZERO);
            if age <= self.threshold {
                report.skipped_fresh += 1;
                continue;
            }

            match self.arena.destroy(&entry.session_id) {
                DestroyOutcome::Removed => {
                    report.reclaimed += 1;
                    info!(
                        session_id = %entry.session_id,
                        age = %format_duration(Duration::from_secs(age.as_secs())),
                        "Reclaimed stale session"
                    );
                }
                DestroyOutcome::NotFound => {
                    debug!(session_id = %entry.session_id, "Stale session already gone");
                }
                DestroyOutcome::Partial { remaining } => {
                    report.reclaimed += 1;
                    warn!(session_id = %entry.session_id, remaining, "Stale session partially reclaimed");
                }
            }
        }

        report
    }

    /// One pass against the wall clock, off the async runtime
    pub async fn run_pass_now(&self) -> ReclaimReport {
        let reclaimer = self.clone();
        match tokio::task::spawn_blocking(move || reclaimer.run_pass(SystemTime::now())).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Reclamation pass aborted");
                ReclaimReport::default()
            }
        }
    }

    /// Start the background loop; it stops when `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                threshold = %format_duration(self.threshold),
                interval = %format_duration(self.interval),
                root = %self.arena.root().display(),
                "Reclamation loop started"
            );

            // First tick fires immediately: the startup pass
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.run_pass_now().await;
                        if report.reclaimed > 0 {
                            info!(?report, "Reclamation pass complete");
                        } else {
                            debug!(?report, "Reclamation pass complete");
                        }
                    }
                }
            }

            info!("Reclamation loop stopped");
        })
    }
}
