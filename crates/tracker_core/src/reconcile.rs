use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{Category, LaundryRecord},
    error::{LaundryError, LaundryResult},
    protocol::BackupSnapshot,
};

use crate::categories::ensure_unique_ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub categories: usize,
    pub records: usize,
    /// Imported reminder handles that point at nothing until rescheduled.
    pub stale_reminders: usize,
}

pub fn build_snapshot(
    categories: &[Category],
    records: &[LaundryRecord],
    app_version: &str,
    exported_at: DateTime<Utc>,
) -> BackupSnapshot {
    BackupSnapshot {
        categories: categories.to_vec(),
        records: records.to_vec(),
        export_date: Some(exported_at),
        app_version: Some(app_version.to_string()),
    }
}

/// Decodes and checks a backup before anything is touched. Any failure here
/// is `MalformedBackup`; a snapshot that passes can be applied wholesale.
pub fn parse_snapshot(raw: &str) -> LaundryResult<BackupSnapshot> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| LaundryError::malformed_backup(format!("not valid JSON: {err}")))?;
    let Value::Object(mut fields) = value else {
        return Err(LaundryError::malformed_backup("backup must be a JSON object"));
    };

    let categories: Vec<Category> = required_array(fields.remove("categories"), "categories")?;
    let records: Vec<LaundryRecord> = required_array(fields.remove("records"), "records")?;

    if let Some(category) = categories
        .iter()
        .find(|c| c.name.trim().is_empty() || c.icon.trim().is_empty())
    {
        return Err(LaundryError::malformed_backup(format!(
            "category {} has a blank name or icon",
            category.id
        )));
    }
    if let Err(id) = ensure_unique_ids(&categories) {
        return Err(LaundryError::malformed_backup(format!(
            "category id {id} appears more than once"
        )));
    }

    let mut record_ids = HashSet::new();
    for record in &records {
        if !record_ids.insert(&record.id) {
            return Err(LaundryError::malformed_backup(format!(
                "record id {} appears more than once",
                record.id
            )));
        }
        if !record.is_consistent() {
            return Err(LaundryError::malformed_backup(format!(
                "record {} has no items, a zero quantity, or a status that disagrees with its return date",
                record.id
            )));
        }
    }

    let export_date = fields
        .remove("exportDate")
        .and_then(|v| serde_json::from_value(v).ok());
    let app_version = fields
        .remove("appVersion")
        .and_then(|v| v.as_str().map(str::to_string));

    Ok(BackupSnapshot {
        categories,
        records,
        export_date,
        app_version,
    })
}

fn required_array<T: DeserializeOwned>(value: Option<Value>, field: &str) -> LaundryResult<Vec<T>> {
    match value {
        Some(value @ Value::Array(_)) => serde_json::from_value(value).map_err(|err| {
            LaundryError::malformed_backup(format!("`{field}` has an invalid entry: {err}"))
        }),
        Some(_) => Err(LaundryError::malformed_backup(format!(
            "`{field}` must be an array"
        ))),
        None => Err(LaundryError::malformed_backup(format!(
            "`{field}` is missing"
        ))),
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
