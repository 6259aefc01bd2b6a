use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Category, LaundryRecord};

pub const CATEGORIES_STORAGE_KEY: &str = "laundry-categories-storage";
pub const RECORDS_STORAGE_KEY: &str = "laundry-records-storage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesDocument {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordsDocument {
    pub records: Vec<LaundryRecord>,
}

/// Backup file written by export and read by import. Only `categories` and
/// `records` are required when reading; the rest is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub categories: Vec<Category>,
    pub records: Vec<LaundryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}
