use super::*;
use shared::{domain::CategoryId, error::ErrorCode};

fn item(category: &str, quantity: u32) -> LaundryItem {
    LaundryItem {
        category_id: CategoryId::from(category),
        category_name: format!("category-{category}"),
        category_icon: "👕".into(),
        quantity,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).expect("date")
}

fn new_record(id: &str, items: Vec<LaundryItem>) -> NewRecord {
    NewRecord {
        id: RecordId::from(id),
        date_given: day(1),
        items,
        notes: None,
        expected_pickup_time: None,
        alarm_enabled: false,
        notification_id: None,
    }
}

fn assert_invariants(store: &RecordStore) {
    for record in store.list() {
        assert_eq!(record.total_items, total_quantity(&record.items));
        assert!(record.is_consistent(), "inconsistent record {}", record.id);
    }
}

#[test]
fn create_filters_zero_quantities_and_totals_items() {
    let mut store = RecordStore::default();
    let record = store
        .create(new_record("a", vec![item("1", 3), item("2", 0), item("6", 2)]))
        .expect("create")
        .clone();

    assert_eq!(record.items.len(), 2);
    assert_eq!(record.total_items, 5);
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.date_returned, None);
    assert_invariants(&store);
}

#[test]
fn create_with_only_zero_counts_is_rejected() {
    let mut store = RecordStore::default();
    let err = store
        .create(new_record("a", vec![item("1", 0), item("2", 0)]))
        .expect_err("empty");
    assert_eq!(err.code(), ErrorCode::Validation);
    assert!(store.is_empty());
}

#[test]
fn create_prepends_newest_first() {
    let mut store = RecordStore::default();
    store.create(new_record("old", vec![item("1", 1)])).expect("create");
    store.create(new_record("new", vec![item("1", 1)])).expect("create");

    let ids: Vec<_> = store.list().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
}

#[test]
fn create_rejects_duplicate_id() {
    let mut store = RecordStore::default();
    store.create(new_record("a", vec![item("1", 1)])).expect("create");
    let err = store
        .create(new_record("a", vec![item("2", 1)]))
        .expect_err("duplicate");
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(store.len(), 1);
}

#[test]
fn create_keeps_supplied_reminder_handle() {
    let mut store = RecordStore::default();
    let mut draft = new_record("a", vec![item("1", 1)]);
    draft.notification_id = Some(ReminderHandle::from("n-1"));
    draft.alarm_enabled = true;

    let record = store.create(draft).expect("create");
    assert_eq!(record.notification_id, Some(ReminderHandle::from("n-1")));
    assert!(record.alarm_enabled);
}

#[test]
fn update_recomputes_total_when_items_change() {
    let mut store = RecordStore::default();
    store.create(new_record("a", vec![item("1", 1)])).expect("create");

    let matched = store
        .update(
            &RecordId::from("a"),
            RecordPatch {
                items: Some(vec![item("1", 4), item("3", 0), item("5", 2)]),
                notes: Some(Some("starch".into())),
                ..RecordPatch::default()
            },
        )
        .expect("update");
    assert!(matched);

    let record = store.get(&RecordId::from("a")).expect("record");
    assert_eq!(record.total_items, 6);
    assert_eq!(record.items.len(), 2);
    assert_eq!(record.notes.as_deref(), Some("starch"));
    assert_invariants(&store);
}

#[test]
fn update_with_empty_items_is_rejected_and_state_kept() {
    let mut store = RecordStore::default();
    store.create(new_record("a", vec![item("1", 2)])).expect("create");
    let before = store.clone();

    let err = store
        .update(
            &RecordId::from("a"),
            RecordPatch {
                items: Some(vec![item("1", 0)]),
                ..RecordPatch::default()
            },
        )
        .expect_err("empty items");
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(store, before);
}

#[test]
fn update_unknown_id_is_a_no_op() {
    let mut store = RecordStore::default();
    let matched = store
        .update(&RecordId::from("nope"), RecordPatch::default())
        .expect("update");
    assert!(!matched);
}

#[test]
fn mark_returned_detaches_reminder_and_is_idempotent() {
    let mut store = RecordStore::default();
    let mut draft = new_record("a", vec![item("1", 1)]);
    draft.notification_id = Some(ReminderHandle::from("n-1"));
    store.create(draft).expect("create");

    let first = store.mark_returned(&RecordId::from("a"), day(3));
    assert_eq!(
        first,
        ReturnOutcome::Returned {
            detached_reminder: Some(ReminderHandle::from("n-1"))
        }
    );

    let second = store.mark_returned(&RecordId::from("a"), day(9));
    assert_eq!(second, ReturnOutcome::Unchanged);

    let record = store.get(&RecordId::from("a")).expect("record");
    assert_eq!(record.status, RecordStatus::Returned);
    assert_eq!(record.date_returned, Some(day(3)));
    assert_eq!(record.notification_id, None);
    assert_invariants(&store);
}

#[test]
fn mark_returned_unknown_id_is_unchanged() {
    let mut store = RecordStore::default();
    assert_eq!(
        store.mark_returned(&RecordId::from("ghost"), day(1)),
        ReturnOutcome::Unchanged
    );
}

#[test]
fn pending_and_returned_filters_follow_transitions() {
    let mut store = RecordStore::default();
    store.create(new_record("a", vec![item("1", 1)])).expect("create");
    store.create(new_record("b", vec![item("1", 1)])).expect("create");
    store.mark_returned(&RecordId::from("a"), day(2));

    let pending: Vec<_> = store.pending().iter().map(|r| r.id.as_str()).collect();
    let returned: Vec<_> = store.returned().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(pending, vec!["b"]);
    assert_eq!(returned, vec!["a"]);
}

#[test]
fn delete_removes_from_either_state() {
    let mut store = RecordStore::default();
    store.create(new_record("a", vec![item("1", 1)])).expect("create");
    store.create(new_record("b", vec![item("1", 1)])).expect("create");
    store.mark_returned(&RecordId::from("a"), day(2));

    assert!(store.delete(&RecordId::from("a")).is_some());
    assert!(store.delete(&RecordId::from("b")).is_some());
    assert!(store.delete(&RecordId::from("b")).is_none());
    assert!(store.is_empty());
}

#[test]
fn clear_all_returns_attached_handles() {
    let mut store = RecordStore::default();
    let mut with_reminder = new_record("a", vec![item("1", 1)]);
    with_reminder.notification_id = Some(ReminderHandle::from("n-a"));
    store.create(with_reminder).expect("create");
    store.create(new_record("b", vec![item("1", 1)])).expect("create");

    let handles = store.clear_all();
    assert_eq!(handles, vec![ReminderHandle::from("n-a")]);
    assert!(store.is_empty());
}

#[test]
fn take_reminder_only_clears_matching_handle() {
    let mut store = RecordStore::default();
    let mut draft = new_record("a", vec![item("1", 1)]);
    draft.notification_id = Some(ReminderHandle::from("n-2"));
    store.create(draft).expect("create");

    assert!(!store.take_reminder(&RecordId::from("a"), &ReminderHandle::from("n-1")));
    assert!(store.take_reminder(&RecordId::from("a"), &ReminderHandle::from("n-2")));
    assert_eq!(
        store.get(&RecordId::from("a")).and_then(|r| r.notification_id.clone()),
        None
    );
}

#[test]
fn replace_all_recomputes_totals() {
    let mut store = RecordStore::default();
    let mut record = LaundryRecord {
        id: RecordId::from("imported"),
        date_given: day(1),
        date_returned: None,
        items: vec![item("1", 2), item("2", 3)],
        total_items: 99,
        status: RecordStatus::Pending,
        notes: None,
        expected_pickup_time: None,
        alarm_enabled: false,
        notification_id: Some(ReminderHandle::from("stale")),
    };
    store.replace_all(vec![record.clone()]);

    record.total_items = 5;
    assert_eq!(store.list(), &[record]);
}

#[test]
fn detach_reminders_keeps_records_and_pickup_times() {
    let mut store = RecordStore::default();
    let mut with_reminder = new_record("a", vec![item("1", 1)]);
    with_reminder.notification_id = Some(ReminderHandle::from("n-a"));
    with_reminder.expected_pickup_time = Some(Utc::now());
    store.create(with_reminder).expect("create");
    store.create(new_record("b", vec![item("1", 1)])).expect("create");

    assert_eq!(store.detach_reminders(), vec![ReminderHandle::from("n-a")]);
    assert_eq!(store.len(), 2);
    let record = store.get(&RecordId::from("a")).expect("record");
    assert_eq!(record.notification_id, None);
    assert!(record.expected_pickup_time.is_some());
    assert!(store.detach_reminders().is_empty());
}
