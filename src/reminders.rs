//! Deferred reminder scheduling.
//!
//! Each reminder gets a detached timer task that fires exactly once and
//! re-enters the speech path from off the main loop. Cancellation and
//! firing race on the registry lock; whichever removes the entry first
//! wins, so a cancelled reminder can never notify.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Callback invoked with the reminder message when it fires.
pub type NotifyFn = Arc<dyn Fn(&str) + Send + Sync>;

struct ActiveReminder {
    message: String,
    fire_at: Instant,
    cancel: CancellationToken,
}

/// A scheduled-but-not-yet-fired reminder, as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReminder {
    /// Reminder id, usable with [`ReminderScheduler::cancel`].
    pub id: u64,
    /// Seconds until it fires.
    pub seconds_left: u64,
    /// Reminder message.
    pub message: String,
}

/// Schedules deferred callbacks on detached timer tasks.
#[derive(Clone, Default)]
pub struct ReminderScheduler {
    active: Arc<Mutex<HashMap<u64, ActiveReminder>>>,
    next_id: Arc<AtomicU64>,
}

impl ReminderScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `notify(message)` to run once after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, delay: Duration, message: &str, notify: NotifyFn) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.insert(
                id,
                ActiveReminder {
                    message: message.to_owned(),
                    fire_at: Instant::now() + delay,
                    cancel: cancel.clone(),
                },
            );
        }
        info!("reminder {id} set for {}s: {message}", delay.as_secs());

        let registry = Arc::clone(&self.active);
        let message = message.to_owned();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("reminder {id} cancelled before firing");
                }
                () = tokio::time::sleep(delay) => {
                    // Remove-then-notify under the lock so a concurrent
                    // cancel either prevents the callback or misses.
                    let won = registry
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id)
                        .is_some();
                    if won {
                        info!("reminder {id} firing");
                        notify(&message);
                    }
                }
            }
        });

        id
    }

    /// Cancel a reminder before it fires. Returns `false` if it already
    /// fired or never existed.
    pub fn cancel(&self, id: u64) -> bool {
        let removed = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        match removed {
            Some(reminder) => {
                reminder.cancel.cancel();
                info!("reminder {id} cancelled");
                true
            }
            None => false,
        }
    }

    /// Remaining reminders sorted soonest-first.
    ///
    /// Entries whose fire time has passed without cancellation are
    /// treated as already fired and purged from the listing.
    #[must_use]
    pub fn list_active(&self) -> Vec<PendingReminder> {
        let now = Instant::now();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.retain(|_, reminder| reminder.fire_at > now);

        let mut pending: Vec<PendingReminder> = active
            .iter()
            .map(|(id, reminder)| PendingReminder {
                id: *id,
                seconds_left: reminder.fire_at.saturating_duration_since(now).as_secs(),
                message: reminder.message.clone(),
            })
            .collect();
        pending.sort_by_key(|r| r.seconds_left);
        pending
    }
}
