use super::*;

fn record(id: &str) -> RecordId {
    RecordId::from(id)
}

#[test]
fn alarm_content_requests_max_priority_and_long_vibration() {
    let content = NotificationContent::pickup(&record("r1"), true);
    assert_eq!(content.priority, Priority::Max);
    assert!(content.sound);
    assert_eq!(content.vibration_pattern_ms, vec![0, 250, 250, 250]);
    assert_eq!(content.title, REMINDER_TITLE);
    assert_eq!(content.record_key, record("r1"));
    assert_eq!(content.channel_id, REMINDER_CHANNEL_ID);
}

#[test]
fn quiet_content_is_silent_with_short_vibration() {
    let content = NotificationContent::pickup(&record("r1"), false);
    assert_eq!(content.priority, Priority::High);
    assert!(!content.sound);
    assert_eq!(content.vibration_pattern_ms, vec![0, 250]);
}

#[test]
fn reminder_errors_map_to_reminder_service_code() {
    let err: LaundryError = ReminderError::PermissionDenied.into();
    assert_eq!(err.code(), shared::error::ErrorCode::ReminderService);
}

#[tokio::test(start_paused = true)]
async fn fires_once_after_delay() {
    let service = TimerReminderService::new();
    let mut fired = service.subscribe();

    let handle = service
        .schedule_after(&record("r1"), 60, true)
        .await
        .expect("schedule");
    assert_eq!(service.outstanding(), 1);

    tokio::time::advance(Duration::from_secs(59 * 60)).await;
    assert!(fired.try_recv().is_err());

    let event = fired.recv().await.expect("fired");
    assert_eq!(event.handle, handle);
    assert_eq!(event.content.record_key, record("r1"));
    assert_eq!(event.content.priority, Priority::Max);
    assert_eq!(service.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_reminder_never_fires() {
    let service = TimerReminderService::new();
    let mut fired = service.subscribe();

    let handle = service
        .schedule_after(&record("r1"), 5, false)
        .await
        .expect("schedule");
    service.cancel(&handle).await.expect("cancel");
    service.cancel(&handle).await.expect("second cancel is a no-op");
    assert_eq!(service.outstanding(), 0);

    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    tokio::task::yield_now().await;
    assert!(matches!(
        fired.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test(start_paused = true)]
async fn cancel_all_drops_every_outstanding_reminder() {
    let service = TimerReminderService::new();
    for key in ["a", "b", "c"] {
        service
            .schedule_after(&record(key), 30, false)
            .await
            .expect("schedule");
    }
    assert_eq!(service.outstanding(), 3);

    service.cancel_all().await.expect("cancel all");
    assert_eq!(service.outstanding(), 0);
}

#[tokio::test]
async fn zero_delay_is_rejected() {
    let service = TimerReminderService::new();
    let err = service
        .schedule_after(&record("r1"), 0, false)
        .await
        .expect_err("should fail");
    assert!(matches!(err, ReminderError::InvalidDelay));
}

#[tokio::test]
async fn past_time_is_rejected() {
    let service = TimerReminderService::new();
    let at = Utc::now() - chrono::Duration::minutes(1);
    let err = service
        .schedule_at(&record("r1"), at, false)
        .await
        .expect_err("should fail");
    assert!(matches!(err, ReminderError::NotInFuture(t) if t == at));
    assert_eq!(service.outstanding(), 0);
}

#[tokio::test]
async fn future_time_is_scheduled() {
    let service = TimerReminderService::new();
    let at = Utc::now() + chrono::Duration::hours(2);
    service
        .schedule_at(&record("r1"), at, true)
        .await
        .expect("schedule");
    assert_eq!(service.outstanding(), 1);
    service.cancel_all().await.expect("cleanup");
}
