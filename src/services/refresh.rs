//! Periodic token renewal.
//!
//! One task runs per logged-in session. It holds only a weak reference to
//! the session context, so dropping the last context ends the task even if
//! nobody called logout.

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::session::WeakSession;

/// Owns a running refresh task. Dropping the handle cancels the task.
pub struct RefreshHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task. Equivalent to dropping the handle.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.abort();
    }
}

/// Renew the session token every `period`, first tick one period from now.
///
/// Ticks that find the session logged out make no request.
pub(crate) fn spawn_refresh_task(session: WeakSession, period: Duration) -> RefreshHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let start = Instant::now() + period;

    let task = tokio::spawn(async move {
        let mut interval = interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "token refresh scheduled");

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    debug!("token refresh stopped");
                    break;
                }
                _ = interval.tick() => {}
            }

            let Some(session) = session.upgrade() else {
                debug!("session dropped; token refresh exiting");
                break;
            };
            if !session.is_authenticated() {
                debug!("refresh tick skipped: logged out");
                continue;
            }
            if let Err(e) = session.refresh_token().await {
                debug!(error = %e, "scheduled token refresh failed");
            }
        }
    });

    RefreshHandle { stop: Some(stop_tx), task }
}
