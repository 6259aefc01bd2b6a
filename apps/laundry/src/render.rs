use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use shared::domain::{Category, LaundryRecord, RecordStatus};

pub fn category_line(category: &Category) -> String {
    format!(
        "{:>3}. {} {}  (id {})",
        category.order, category.icon, category.name, category.id
    )
}

pub fn record_line(record: &LaundryRecord) -> String {
    let mut line = format!(
        "{}  {:<8}  given {}  {} item{}",
        record.id,
        record.status.as_str(),
        record.date_given,
        record.total_items,
        if record.total_items == 1 { "" } else { "s" }
    );
    match (record.status, record.date_returned) {
        (RecordStatus::Returned, Some(date)) => {
            let _ = write!(line, "  returned {date}");
        }
        _ => {
            if let Some(at) = record.expected_pickup_time {
                let _ = write!(line, "  pickup {}", local_time(at));
            }
            if record.notification_id.is_some() {
                line.push_str(if record.alarm_enabled { "  ⏰" } else { "  🔔" });
            }
        }
    }
    line
}

pub fn record_detail(record: &LaundryRecord) -> String {
    let mut out = record_line(record);
    for item in &record.items {
        let _ = write!(
            out,
            "\n    {} {} x{}",
            item.category_icon, item.category_name, item.quantity
        );
    }
    if let Some(notes) = &record.notes {
        let _ = write!(out, "\n    notes: {notes}");
    }
    out
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
