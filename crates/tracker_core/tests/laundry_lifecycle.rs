use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{Duration, Utc};
use reminders::TimerReminderService;
use shared::domain::{CategoryId, RecordStatus};
use storage::Storage;
use tracker_core::{LaundryTracker, PickupSchedule, RecordDraft};

async fn open_tracker(database_url: &str, reminders: &TimerReminderService) -> LaundryTracker {
    let storage = Storage::new(database_url).await.expect("db");
    LaundryTracker::open(Arc::new(storage), Arc::new(reminders.clone()), "0.1.0")
        .await
        .expect("tracker")
}

#[tokio::test]
async fn fired_reminder_is_delivered_and_state_survives_restart() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("laundry.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    let reminders = TimerReminderService::new();
    let mut fired = reminders.subscribe();

    let mut tracker = open_tracker(&database_url, &reminders).await;
    let towels = tracker.add_category("Towels", "🛁").await.expect("category");
    let record = tracker
        .create_record(
            RecordDraft::default()
                .with_count(towels.id.clone(), 2)
                .with_count(CategoryId::from("1"), 3)
                .with_pickup(
                    PickupSchedule::At(Utc::now() + Duration::milliseconds(300)),
                    true,
                ),
        )
        .await
        .expect("record");
    let handle = record.notification_id.clone().expect("reminder scheduled");
    assert_eq!(reminders.outstanding(), 1);

    let event = tokio::time::timeout(StdDuration::from_secs(5), fired.recv())
        .await
        .expect("reminder fired in time")
        .expect("event");
    assert_eq!(event.handle, handle);
    assert_eq!(event.content.record_key, record.id);

    let still_there = tracker
        .handle_reminder_fired(&event.content.record_key, &event.handle)
        .await
        .expect("fired");
    assert_eq!(still_there.and_then(|r| r.notification_id), None);

    tracker.mark_returned(&record.id).await.expect("return");
    drop(tracker);

    let reopened = open_tracker(&database_url, &reminders).await;
    assert_eq!(reopened.categories().len(), 7);
    let stored = reopened.record(&record.id).expect("record persisted");
    assert_eq!(stored.status, RecordStatus::Returned);
    assert_eq!(stored.total_items, 5);
    assert!(stored.date_returned.is_some());
    assert_eq!(stored.notification_id, None);
}

#[tokio::test]
async fn deleting_and_clearing_abort_outstanding_timers() {
    let reminders = TimerReminderService::new();
    let mut tracker = open_tracker("sqlite::memory:", &reminders).await;

    let first = tracker
        .create_record(
            RecordDraft::default()
                .with_count("1", 1)
                .with_pickup(PickupSchedule::AfterMinutes(30), false),
        )
        .await
        .expect("record");
    tracker
        .create_record(
            RecordDraft::default()
                .with_count("2", 1)
                .with_pickup(PickupSchedule::AfterMinutes(45), true),
        )
        .await
        .expect("record");
    assert_eq!(reminders.outstanding(), 2);

    tracker.delete_record(&first.id).await.expect("delete");
    assert_eq!(reminders.outstanding(), 1);

    tracker.clear_all_data().await.expect("clear");
    assert_eq!(reminders.outstanding(), 0);
    assert!(tracker.records().is_empty());
}

#[tokio::test]
async fn exported_backup_restores_into_a_fresh_database() {
    let reminders = TimerReminderService::new();
    let mut source = open_tracker("sqlite::memory:", &reminders).await;
    source.add_category("Bedsheets", "🛏️").await.expect("category");
    source
        .create_record(RecordDraft::default().with_count("6", 4).with_notes("wool"))
        .await
        .expect("record");
    let backup = source.export_json().expect("export");

    let mut target = open_tracker("sqlite::memory:", &reminders).await;
    let summary = target.import_snapshot(&backup).await.expect("import");
    assert_eq!(summary.categories, 7);
    assert_eq!(summary.records, 1);
    assert_eq!(target.categories(), source.categories());
    assert_eq!(target.records(), source.records());
}
