//! Periodic re-listing of the current directory
//!
//! Change detection compares name sets only: a changed count or a name the
//! cache has never seen counts as a change. Reordering and in-place edits
//! of same-named files go unnoticed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::browser::RemoteBrowser;
use crate::events::{emit, AppEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No live session or no open directory
    Skipped,
    Unchanged,
    /// Cache reloaded and `directory-changed` emitted
    Changed,
    /// Listing failed; the view was sent back to the session list
    Lost,
}

pub struct ReconciliationLoop {
    browser: Arc<RemoteBrowser>,
    interval: Duration,
}

impl ReconciliationLoop {
    pub fn new(browser: Arc<RemoteBrowser>, interval: Duration) -> Self {
        Self { browser, interval }
    }

    pub async fn tick(&self) -> TickOutcome {
        let Some(path) = self.browser.current_path() else {
            return TickOutcome::Skipped;
        };
        if !self.browser.executor().registry().is_connected().await {
            return TickOutcome::Skipped;
        }

        let names = match self.browser.executor().list(&path).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Polling {} failed: {}", path, e);
                self.browser.return_to_sessions();
                return TickOutcome::Lost;
            }
        };

        let cached = self.browser.cache().names(&path).unwrap_or_default();
        if !differs(&names, &cached) {
            return TickOutcome::Unchanged;
        }

        info!("Remote change detected in {}", path);
        self.browser.cache().store(&names, &path, true);
        emit(self.browser.events(), AppEvent::DirectoryChanged { path });
        TickOutcome::Changed
    }

    /// Polls on a fixed interval until the task is aborted. The first poll
    /// happens one interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let outcome = self.tick().await;
                debug!("Reconciliation tick: {:?}", outcome);
            }
        })
    }
}

fn differs(listed: &[String], cached: &[String]) -> bool {
    if listed.len() != cached.len() {
        return true;
    }
    let known: HashSet<&str> = cached.iter().map(String::as_str).collect();
    listed.iter().any(|name| !known.contains(name.as_str()))
}
