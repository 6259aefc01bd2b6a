use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use reminders::{ReminderError, ReminderService};
use shared::{
    domain::{Category, CategoryId, LaundryItem, LaundryRecord, RecordId, ReminderHandle},
    error::{LaundryError, LaundryResult},
    protocol::BackupSnapshot,
};
use storage::DocumentStore;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub mod categories;
pub mod reconcile;
pub mod records;

pub use categories::{CategoryPatch, CategoryRegistry};
pub use reconcile::ImportSummary;
pub use records::{NewRecord, RecordPatch, RecordStore, ReturnOutcome};

/// When the owner expects to pick a batch up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupSchedule {
    AfterMinutes(u32),
    At(DateTime<Utc>),
}

/// A new entry as the owner fills it in: counts per category id, resolved
/// against the live registry when the record is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDraft {
    pub counts: HashMap<CategoryId, u32>,
    pub notes: Option<String>,
    pub pickup: Option<PickupSchedule>,
    pub alarm_enabled: bool,
    pub date_given: Option<NaiveDate>,
}

impl RecordDraft {
    pub fn with_count(mut self, category_id: impl Into<CategoryId>, count: u32) -> Self {
        *self.counts.entry(category_id.into()).or_default() += count;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_pickup(mut self, pickup: PickupSchedule, alarm_enabled: bool) -> Self {
        self.pickup = Some(pickup);
        self.alarm_enabled = alarm_enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    CategoriesChanged,
    RecordsChanged,
    ReminderFailed { record_id: RecordId, reason: String },
}

/// Owns the category registry and the record store, keeps each record's
/// reminder binding in step with its lifecycle, and writes both documents
/// back after every change.
///
/// In-memory changes always commit. Reminder failures are logged and
/// reported as [`TrackerEvent::ReminderFailed`]; a failed durable write is
/// returned as [`LaundryError::Persistence`] without undoing the change.
pub struct LaundryTracker {
    categories: CategoryRegistry,
    records: RecordStore,
    reminders: Arc<dyn ReminderService>,
    documents: Arc<dyn DocumentStore>,
    events: broadcast::Sender<TrackerEvent>,
    app_version: String,
}

impl LaundryTracker {
    pub async fn open(
        documents: Arc<dyn DocumentStore>,
        reminders: Arc<dyn ReminderService>,
        app_version: impl Into<String>,
    ) -> LaundryResult<Self> {
        let categories = storage::load_categories(documents.as_ref())
            .await
            .map_err(persistence_error)?;
        let records = storage::load_records(documents.as_ref())
            .await
            .map_err(persistence_error)?;
        info!(
            "tracker: opened categories={} records={}",
            categories.len(),
            records.len()
        );

        let (events, _) = broadcast::channel(256);
        Ok(Self {
            categories: CategoryRegistry::new(categories),
            records: RecordStore::new(records),
            reminders,
            documents,
            events,
            app_version: app_version.into(),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.categories
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn record(&self, id: &RecordId) -> Option<&LaundryRecord> {
        self.records.get(id)
    }

    pub fn pending(&self) -> Vec<&LaundryRecord> {
        self.records.pending()
    }

    pub fn returned(&self) -> Vec<&LaundryRecord> {
        self.records.returned()
    }

    pub async fn add_category(&mut self, name: &str, icon: &str) -> LaundryResult<Category> {
        let category = self.categories.add(name, icon)?;
        info!("tracker: added category id={} name={}", category.id, category.name);
        self.categories_changed().await?;
        Ok(category)
    }

    pub async fn update_category(
        &mut self,
        id: &CategoryId,
        patch: CategoryPatch,
    ) -> LaundryResult<()> {
        if self.categories.update(id, patch)? {
            self.categories_changed().await?;
        }
        Ok(())
    }

    pub async fn delete_category(&mut self, id: &CategoryId) -> LaundryResult<()> {
        if self.categories.delete(id) {
            info!("tracker: deleted category id={id}");
            self.categories_changed().await?;
        }
        Ok(())
    }

    pub async fn reorder_categories(&mut self, ordered: Vec<Category>) -> LaundryResult<()> {
        self.categories.reorder(ordered)?;
        self.categories_changed().await
    }

    pub async fn reset_categories(&mut self) -> LaundryResult<()> {
        self.categories.reset_to_defaults();
        self.categories_changed().await
    }

    /// Snapshots the counted categories, schedules the pickup reminder and
    /// stores the record. A reminder that cannot be scheduled leaves the
    /// record without a pickup time or handle.
    pub async fn create_record(&mut self, draft: RecordDraft) -> LaundryResult<LaundryRecord> {
        let items: Vec<LaundryItem> = self
            .categories
            .list()
            .iter()
            .filter_map(|category| {
                let count = draft.counts.get(&category.id).copied().unwrap_or(0);
                (count > 0).then(|| LaundryItem::snapshot(category, count))
            })
            .collect();
        if items.is_empty() {
            return Err(LaundryError::validation(
                "add at least one item to save the entry",
            ));
        }

        let id = RecordId::generate();
        let (expected_pickup_time, notification_id) = match draft.pickup {
            Some(pickup) => self.schedule_pickup(&id, pickup, draft.alarm_enabled).await,
            None => (None, None),
        };

        let new_record = NewRecord {
            id: id.clone(),
            date_given: draft.date_given.unwrap_or_else(today),
            items,
            notes: draft
                .notes
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
            expected_pickup_time,
            alarm_enabled: draft.alarm_enabled,
            notification_id: notification_id.clone(),
        };
        let created = self.records.create(new_record).cloned();
        let record = match created {
            Ok(record) => record,
            Err(err) => {
                if let Some(handle) = notification_id {
                    self.cancel_reminder(&id, &handle).await;
                }
                return Err(err);
            }
        };

        info!(
            "tracker: created record id={} total_items={} reminder={}",
            record.id,
            record.total_items,
            record.notification_id.is_some()
        );
        self.records_changed().await?;
        Ok(record)
    }

    pub async fn update_record(&mut self, id: &RecordId, patch: RecordPatch) -> LaundryResult<()> {
        if self.records.update(id, patch)? {
            self.records_changed().await?;
        }
        Ok(())
    }

    pub async fn mark_returned(&mut self, id: &RecordId) -> LaundryResult<()> {
        let ReturnOutcome::Returned { detached_reminder } = self.records.mark_returned(id, today())
        else {
            return Ok(());
        };
        info!("tracker: record returned id={id}");
        if let Some(handle) = detached_reminder {
            self.cancel_reminder(id, &handle).await;
        }
        self.records_changed().await
    }

    /// Deletes from either state and cancels a reminder that is still
    /// outstanding, so it cannot fire for a record that no longer exists.
    pub async fn delete_record(&mut self, id: &RecordId) -> LaundryResult<()> {
        let Some(removed) = self.records.delete(id) else {
            return Ok(());
        };
        info!("tracker: deleted record id={id}");
        if let Some(handle) = removed.notification_id {
            self.cancel_reminder(id, &handle).await;
        }
        self.records_changed().await
    }

    /// Replaces a pending record's reminder. Returns the new handle, or
    /// `None` when the record is unknown, already returned, or scheduling
    /// failed.
    pub async fn reschedule_reminder(
        &mut self,
        id: &RecordId,
        pickup: PickupSchedule,
        alarm_enabled: bool,
    ) -> LaundryResult<Option<ReminderHandle>> {
        let Some(previous) = self
            .records
            .get(id)
            .filter(|record| record.is_pending())
            .map(|record| record.notification_id.clone())
        else {
            return Ok(None);
        };
        if let Some(handle) = previous {
            self.cancel_reminder(id, &handle).await;
        }

        let (expected_pickup_time, notification_id) =
            self.schedule_pickup(id, pickup, alarm_enabled).await;
        self.records.update(
            id,
            RecordPatch {
                expected_pickup_time: Some(expected_pickup_time),
                alarm_enabled: Some(alarm_enabled),
                notification_id: Some(notification_id.clone()),
                ..RecordPatch::default()
            },
        )?;
        self.records_changed().await?;
        Ok(notification_id)
    }

    /// Re-arms reminders for pending records whose pickup time is still
    /// ahead, replacing whatever handle they carried. Handles on records whose
    /// pickup time has passed are dropped. Returns how many were scheduled.
    pub async fn rearm_reminders(&mut self) -> LaundryResult<usize> {
        let now = Utc::now();
        let candidates: Vec<_> = self
            .records
            .pending()
            .into_iter()
            .filter(|record| {
                record.expected_pickup_time.is_some() || record.notification_id.is_some()
            })
            .map(|record| {
                (
                    record.id.clone(),
                    record.expected_pickup_time,
                    record.alarm_enabled,
                    record.notification_id.clone(),
                )
            })
            .collect();

        let mut scheduled = 0;
        let mut changed = false;
        for (id, pickup_time, alarm_enabled, stale) in candidates {
            if let Some(handle) = &stale {
                self.cancel_reminder(&id, handle).await;
            }
            let notification_id = match pickup_time.filter(|at| *at > now) {
                Some(at) => match self.reminders.schedule_at(&id, at, alarm_enabled).await {
                    Ok(handle) => {
                        scheduled += 1;
                        Some(handle)
                    }
                    Err(err) => {
                        self.report_reminder_failure(&id, "schedule", err);
                        None
                    }
                },
                None => None,
            };
            if notification_id != stale {
                self.records.update(
                    &id,
                    RecordPatch {
                        notification_id: Some(notification_id),
                        ..RecordPatch::default()
                    },
                )?;
                changed = true;
            }
        }

        if changed {
            self.records_changed().await?;
        }
        info!("tracker: re-armed reminders scheduled={scheduled}");
        Ok(scheduled)
    }

    /// Clears the binding of a reminder that has fired. Returns the record it
    /// belonged to, or `None` when the record is gone and the reminder should
    /// be ignored.
    pub async fn handle_reminder_fired(
        &mut self,
        record_id: &RecordId,
        handle: &ReminderHandle,
    ) -> LaundryResult<Option<LaundryRecord>> {
        if self.records.take_reminder(record_id, handle) {
            self.records_changed().await?;
        }
        Ok(self.records.get(record_id).cloned())
    }

    /// Cancels every reminder and drops every handle before the reminder
    /// service goes away, so no record keeps a binding to nothing. Pickup
    /// times stay for [`Self::rearm_reminders`]. Returns how many were dropped.
    pub async fn release_reminders(&mut self) -> LaundryResult<usize> {
        if let Err(err) = self.reminders.cancel_all().await {
            warn!("tracker: cancel_all on release failed: {err}");
        }
        let released = self.records.detach_reminders().len();
        if released > 0 {
            info!("tracker: released reminders count={released}");
            self.records_changed().await?;
        }
        Ok(released)
    }

    pub fn export_snapshot(&self) -> BackupSnapshot {
        reconcile::build_snapshot(
            self.categories.list(),
            self.records.list(),
            &self.app_version,
            Utc::now(),
        )
    }

    pub fn export_json(&self) -> LaundryResult<String> {
        serde_json::to_string_pretty(&self.export_snapshot()).map_err(LaundryError::persistence)
    }

    /// Replaces records and categories with the backup's contents. Nothing
    /// changes unless the whole backup is well formed. Every outstanding
    /// reminder is cancelled first; imported handles are kept but stale.
    pub async fn import_snapshot(&mut self, raw: &str) -> LaundryResult<ImportSummary> {
        let snapshot = reconcile::parse_snapshot(raw)?;

        if let Err(err) = self.reminders.cancel_all().await {
            warn!("tracker: cancel_all before import failed: {err}");
        }

        let summary = ImportSummary {
            categories: snapshot.categories.len(),
            records: snapshot.records.len(),
            stale_reminders: snapshot
                .records
                .iter()
                .filter(|record| record.notification_id.is_some())
                .count(),
        };
        self.records.replace_all(snapshot.records);
        self.categories.import_all(snapshot.categories);
        info!(
            "tracker: imported categories={} records={} stale_reminders={}",
            summary.categories, summary.records, summary.stale_reminders
        );

        let records_saved = self.records_changed().await;
        let categories_saved = self.categories_changed().await;
        records_saved.and(categories_saved)?;
        Ok(summary)
    }

    /// Cancels every reminder, drops all records and restores the default
    /// categories.
    pub async fn clear_all_data(&mut self) -> LaundryResult<()> {
        if let Err(err) = self.reminders.cancel_all().await {
            warn!("tracker: cancel_all before clear failed: {err}");
        }
        let detached = self.records.clear_all();
        self.categories.reset_to_defaults();
        info!("tracker: cleared all data detached_reminders={}", detached.len());

        let records_saved = self.records_changed().await;
        let categories_saved = self.categories_changed().await;
        records_saved.and(categories_saved)
    }

    async fn schedule_pickup(
        &self,
        id: &RecordId,
        pickup: PickupSchedule,
        alarm_enabled: bool,
    ) -> (Option<DateTime<Utc>>, Option<ReminderHandle>) {
        let now = Utc::now();
        let scheduled = match pickup {
            PickupSchedule::AfterMinutes(minutes) if minutes > 0 => self
                .reminders
                .schedule_after(id, minutes, alarm_enabled)
                .await
                .map(|handle| (now + Duration::minutes(i64::from(minutes)), handle)),
            PickupSchedule::At(at) if at > now => self
                .reminders
                .schedule_at(id, at, alarm_enabled)
                .await
                .map(|handle| (at, handle)),
            _ => return (None, None),
        };

        match scheduled {
            Ok((at, handle)) => (Some(at), Some(handle)),
            Err(err) => {
                self.report_reminder_failure(id, "schedule", err);
                (None, None)
            }
        }
    }

    async fn cancel_reminder(&self, id: &RecordId, handle: &ReminderHandle) {
        if let Err(err) = self.reminders.cancel(handle).await {
            self.report_reminder_failure(id, "cancel", err);
        }
    }

    fn report_reminder_failure(&self, id: &RecordId, action: &str, err: ReminderError) {
        warn!("tracker: reminder {action} failed record={id}: {err}");
        let reason = LaundryError::from(err).to_string();
        let _ = self.events.send(TrackerEvent::ReminderFailed {
            record_id: id.clone(),
            reason,
        });
    }

    async fn records_changed(&self) -> LaundryResult<()> {
        let _ = self.events.send(TrackerEvent::RecordsChanged);
        storage::save_records(self.documents.as_ref(), self.records.list())
            .await
            .map_err(persistence_error)
    }

    async fn categories_changed(&self) -> LaundryResult<()> {
        let _ = self.events.send(TrackerEvent::CategoriesChanged);
        storage::save_categories(self.documents.as_ref(), self.categories.list())
            .await
            .map_err(persistence_error)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn persistence_error(err: anyhow::Error) -> LaundryError {
    error!("tracker: durable storage failed: {err:#}");
    LaundryError::persistence(format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
