use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(CategoryId);
id_newtype!(RecordId);
id_newtype!(ReminderHandle);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub icon: String,
    pub order: i64,
}

/// Copy of a category's fields taken when a record is created. Later edits to
/// the category never reach records that already hold a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaundryItem {
    pub category_id: CategoryId,
    pub category_name: String,
    pub category_icon: String,
    pub quantity: u32,
}

impl LaundryItem {
    pub fn snapshot(category: &Category, quantity: u32) -> Self {
        Self {
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            category_icon: category.icon.clone(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Pending,
    Returned,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Returned => "returned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaundryRecord {
    pub id: RecordId,
    pub date_given: NaiveDate,
    #[serde(default)]
    pub date_returned: Option<NaiveDate>,
    pub items: Vec<LaundryItem>,
    pub total_items: u32,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_pickup_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub alarm_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<ReminderHandle>,
}

impl LaundryRecord {
    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }

    /// `returned` exactly when a return date is recorded, and never without items.
    pub fn is_consistent(&self) -> bool {
        let status_matches = match self.status {
            RecordStatus::Pending => self.date_returned.is_none(),
            RecordStatus::Returned => self.date_returned.is_some(),
        };
        status_matches
            && !self.items.is_empty()
            && self.items.iter().all(|item| item.quantity > 0)
    }
}

pub fn total_quantity(items: &[LaundryItem]) -> u32 {
    items.iter().map(|item| item.quantity).sum()
}

/// Built-in categories. Ids "1" through "6" are fixed so that records created
/// against the defaults keep pointing at the same ids after a reset.
pub fn default_categories() -> Vec<Category> {
    [
        ("1", "Shirts", "👕"),
        ("2", "Pants", "👖"),
        ("3", "Track Pants", "🩳"),
        ("4", "Shorts", "🩳"),
        ("5", "Inners", "🩲"),
        ("6", "Socks", "🧦"),
    ]
    .into_iter()
    .enumerate()
    .map(|(index, (id, name, icon))| Category {
        id: CategoryId::from(id),
        name: name.to_string(),
        icon: icon.to_string(),
        order: index as i64 + 1,
    })
    .collect()
}
