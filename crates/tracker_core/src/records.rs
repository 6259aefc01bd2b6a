use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    domain::{total_quantity, LaundryItem, LaundryRecord, RecordId, RecordStatus, ReminderHandle},
    error::{LaundryError, LaundryResult},
};

/// Everything a new record needs. The reminder handle, if any, was obtained
/// by the caller; the store only keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub id: RecordId,
    pub date_given: NaiveDate,
    pub items: Vec<LaundryItem>,
    pub notes: Option<String>,
    pub expected_pickup_time: Option<DateTime<Utc>>,
    pub alarm_enabled: bool,
    pub notification_id: Option<ReminderHandle>,
}

/// Shallow update. Status and return date are not patchable; they only move
/// through [`RecordStore::mark_returned`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub date_given: Option<NaiveDate>,
    pub items: Option<Vec<LaundryItem>>,
    pub notes: Option<Option<String>>,
    pub expected_pickup_time: Option<Option<DateTime<Utc>>>,
    pub alarm_enabled: Option<bool>,
    pub notification_id: Option<Option<ReminderHandle>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnOutcome {
    /// Unknown id or already returned.
    Unchanged,
    Returned {
        detached_reminder: Option<ReminderHandle>,
    },
}

/// Laundry records, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStore {
    records: Vec<LaundryRecord>,
}

impl RecordStore {
    pub fn new(records: Vec<LaundryRecord>) -> Self {
        let mut store = Self::default();
        store.replace_all(records);
        store
    }

    pub fn list(&self) -> &[LaundryRecord] {
        &self.records
    }

    pub fn get(&self, id: &RecordId) -> Option<&LaundryRecord> {
        self.records.iter().find(|record| &record.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending(&self) -> Vec<&LaundryRecord> {
        self.with_status(RecordStatus::Pending)
    }

    pub fn returned(&self) -> Vec<&LaundryRecord> {
        self.with_status(RecordStatus::Returned)
    }

    fn with_status(&self, status: RecordStatus) -> Vec<&LaundryRecord> {
        self.records
            .iter()
            .filter(|record| record.status == status)
            .collect()
    }

    pub fn create(&mut self, new_record: NewRecord) -> LaundryResult<&LaundryRecord> {
        let items = positive_items(new_record.items)?;
        if self.get(&new_record.id).is_some() {
            return Err(LaundryError::validation(format!(
                "record {} already exists",
                new_record.id
            )));
        }

        let record = LaundryRecord {
            id: new_record.id,
            date_given: new_record.date_given,
            date_returned: None,
            total_items: total_quantity(&items),
            items,
            status: RecordStatus::Pending,
            notes: new_record.notes,
            expected_pickup_time: new_record.expected_pickup_time,
            alarm_enabled: new_record.alarm_enabled,
            notification_id: new_record.notification_id,
        };
        self.records.insert(0, record);
        Ok(&self.records[0])
    }

    /// Returns whether a record matched. Unknown ids are not an error.
    pub fn update(&mut self, id: &RecordId, patch: RecordPatch) -> LaundryResult<bool> {
        let items = patch.items.map(positive_items).transpose()?;

        let Some(record) = self.records.iter_mut().find(|r| &r.id == id) else {
            return Ok(false);
        };
        if let Some(date_given) = patch.date_given {
            record.date_given = date_given;
        }
        if let Some(items) = items {
            record.total_items = total_quantity(&items);
            record.items = items;
        }
        if let Some(notes) = patch.notes {
            record.notes = notes;
        }
        if let Some(expected_pickup_time) = patch.expected_pickup_time {
            record.expected_pickup_time = expected_pickup_time;
        }
        if let Some(alarm_enabled) = patch.alarm_enabled {
            record.alarm_enabled = alarm_enabled;
        }
        if let Some(notification_id) = patch.notification_id {
            record.notification_id = notification_id;
        }
        Ok(true)
    }

    /// Moves a pending record to returned and hands back its outstanding
    /// reminder for the caller to cancel. A second call changes nothing.
    pub fn mark_returned(&mut self, id: &RecordId, today: NaiveDate) -> ReturnOutcome {
        let Some(record) = self
            .records
            .iter_mut()
            .find(|r| &r.id == id && r.status == RecordStatus::Pending)
        else {
            return ReturnOutcome::Unchanged;
        };
        record.status = RecordStatus::Returned;
        record.date_returned = Some(today);
        ReturnOutcome::Returned {
            detached_reminder: record.notification_id.take(),
        }
    }

    /// Removes the record whatever its status. Cancelling its reminder is up
    /// to the caller.
    pub fn delete(&mut self, id: &RecordId) -> Option<LaundryRecord> {
        let index = self.records.iter().position(|record| &record.id == id)?;
        Some(self.records.remove(index))
    }

    /// Empties the store and returns every handle that was still attached.
    pub fn clear_all(&mut self) -> Vec<ReminderHandle> {
        self.records
            .drain(..)
            .filter_map(|record| record.notification_id)
            .collect()
    }

    /// Strips every attached handle, keeping records and pickup times.
    pub fn detach_reminders(&mut self) -> Vec<ReminderHandle> {
        self.records
            .iter_mut()
            .filter_map(|record| record.notification_id.take())
            .collect()
    }

    /// Clears the record's reminder handle if it is still `handle`.
    pub fn take_reminder(&mut self, id: &RecordId, handle: &ReminderHandle) -> bool {
        match self.records.iter_mut().find(|r| &r.id == id) {
            Some(record) if record.notification_id.as_ref() == Some(handle) => {
                record.notification_id = None;
                true
            }
            _ => false,
        }
    }

    /// Wholesale replace. Totals are recomputed from items; everything else,
    /// including possibly stale reminder handles, is kept as given.
    pub fn replace_all(&mut self, records: Vec<LaundryRecord>) {
        self.records = records
            .into_iter()
            .map(|mut record| {
                record.total_items = total_quantity(&record.items);
                record
            })
            .collect();
    }
}

fn positive_items(items: Vec<LaundryItem>) -> LaundryResult<Vec<LaundryItem>> {
    let items: Vec<_> = items.into_iter().filter(|item| item.quantity > 0).collect();
    if items.is_empty() {
        return Err(LaundryError::validation(
            "a record needs at least one item with a positive quantity",
        ));
    }
    Ok(items)
}

#[cfg(test)]
#[path = "tests/records_tests.rs"]
mod tests;
