use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{RecordId, ReminderHandle},
    error::LaundryError,
};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle, time::Duration};
use tracing::{debug, info};

pub const REMINDER_CHANNEL_ID: &str = "laundry-reminders";
pub const REMINDER_TITLE: &str = "🧺 Laundry Ready!";
pub const REMINDER_BODY: &str = "Your laundry should be ready for pickup now.";

const ALARM_VIBRATION_PATTERN: [u64; 4] = [0, 250, 250, 250];
const QUIET_VIBRATION_PATTERN: [u64; 2] = [0, 250];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub record_key: RecordId,
    pub sound: bool,
    pub priority: Priority,
    pub vibration_pattern_ms: Vec<u64>,
}

impl NotificationContent {
    /// Alarm reminders ask for maximum priority, sound and the long vibration
    /// pattern; the rest are delivered quietly.
    pub fn pickup(record_key: &RecordId, alarm: bool) -> Self {
        let (priority, vibration) = if alarm {
            (Priority::Max, ALARM_VIBRATION_PATTERN.to_vec())
        } else {
            (Priority::High, QUIET_VIBRATION_PATTERN.to_vec())
        };
        Self {
            channel_id: REMINDER_CHANNEL_ID.to_string(),
            title: REMINDER_TITLE.to_string(),
            body: REMINDER_BODY.to_string(),
            record_key: record_key.clone(),
            sound: alarm,
            priority,
            vibration_pattern_ms: vibration,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("reminder delay must be at least one minute")]
    InvalidDelay,
    #[error("reminder time {0} is not in the future")]
    NotInFuture(DateTime<Utc>),
    #[error("notification permission was not granted")]
    PermissionDenied,
    #[error("reminder backend failure: {0}")]
    Backend(String),
}

impl From<ReminderError> for LaundryError {
    fn from(value: ReminderError) -> Self {
        LaundryError::ReminderService(value.to_string())
    }
}

/// One-shot, time-triggered reminders bound to a record key.
#[async_trait]
pub trait ReminderService: Send + Sync {
    async fn schedule_after(
        &self,
        record_key: &RecordId,
        delay_minutes: u32,
        alarm: bool,
    ) -> Result<ReminderHandle, ReminderError>;
    /// Callers only pass a time strictly in the future.
    async fn schedule_at(
        &self,
        record_key: &RecordId,
        at: DateTime<Utc>,
        alarm: bool,
    ) -> Result<ReminderHandle, ReminderError>;
    /// Cancelling a fired or already cancelled handle is not an error.
    async fn cancel(&self, handle: &ReminderHandle) -> Result<(), ReminderError>;
    async fn cancel_all(&self) -> Result<(), ReminderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderFired {
    pub handle: ReminderHandle,
    pub content: NotificationContent,
    pub fired_at: DateTime<Utc>,
}

struct TimerInner {
    tasks: Mutex<HashMap<ReminderHandle, JoinHandle<()>>>,
    events: broadcast::Sender<ReminderFired>,
}

impl TimerInner {
    fn tasks(&self) -> MutexGuard<'_, HashMap<ReminderHandle, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process reminder service: each reminder is a tokio task sleeping until
/// its deadline. Fired reminders are published to every subscriber.
#[derive(Clone)]
pub struct TimerReminderService {
    inner: Arc<TimerInner>,
}

impl Default for TimerReminderService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerReminderService {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(TimerInner {
                tasks: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReminderFired> {
        self.inner.events.subscribe()
    }

    pub fn outstanding(&self) -> usize {
        self.inner.tasks().len()
    }

    fn spawn_reminder(&self, delay: Duration, content: NotificationContent) -> ReminderHandle {
        let handle = ReminderHandle::generate();
        let inner = Arc::clone(&self.inner);
        let task_handle = handle.clone();

        // Held across the spawn so the task cannot remove its entry before it exists.
        let mut tasks = self.inner.tasks();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.tasks().remove(&task_handle);
            info!(
                "reminders: fired handle={} record={}",
                task_handle, content.record_key
            );
            let _ = inner.events.send(ReminderFired {
                handle: task_handle,
                content,
                fired_at: Utc::now(),
            });
        });
        tasks.insert(handle.clone(), task);
        handle
    }
}

#[async_trait]
impl ReminderService for TimerReminderService {
    async fn schedule_after(
        &self,
        record_key: &RecordId,
        delay_minutes: u32,
        alarm: bool,
    ) -> Result<ReminderHandle, ReminderError> {
        if delay_minutes == 0 {
            return Err(ReminderError::InvalidDelay);
        }
        let delay = Duration::from_secs(u64::from(delay_minutes) * 60);
        let handle = self.spawn_reminder(delay, NotificationContent::pickup(record_key, alarm));
        debug!(
            "reminders: scheduled handle={handle} record={record_key} delay_minutes={delay_minutes} alarm={alarm}"
        );
        Ok(handle)
    }

    async fn schedule_at(
        &self,
        record_key: &RecordId,
        at: DateTime<Utc>,
        alarm: bool,
    ) -> Result<ReminderHandle, ReminderError> {
        let delay = (at - Utc::now())
            .to_std()
            .ok()
            .filter(|delay| !delay.is_zero())
            .ok_or(ReminderError::NotInFuture(at))?;
        let handle = self.spawn_reminder(delay, NotificationContent::pickup(record_key, alarm));
        debug!("reminders: scheduled handle={handle} record={record_key} at={at} alarm={alarm}");
        Ok(handle)
    }

    async fn cancel(&self, handle: &ReminderHandle) -> Result<(), ReminderError> {
        if let Some(task) = self.inner.tasks().remove(handle) {
            task.abort();
            debug!("reminders: cancelled handle={handle}");
        }
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), ReminderError> {
        let drained: Vec<_> = self.inner.tasks().drain().collect();
        let count = drained.len();
        for (_, task) in drained {
            task.abort();
        }
        debug!("reminders: cancelled all outstanding reminders count={count}");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
