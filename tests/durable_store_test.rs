//! 持久化集成测试 - JSONL 存储跨进程重启的行为

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use practice_notify::{
    sweeper, Dispatcher, JsonlStore, NotificationDraft, NotificationKind, NotificationStore,
    PreferenceGate, PreferencesUpdate, Priority,
};

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = TempDir::new().unwrap();

    // 第一个"进程"：经分发器写入
    let outcome = {
        let store = Arc::new(JsonlStore::with_dir(dir.path()));
        let dispatcher = Dispatcher::new(store);
        dispatcher
            .create_notification(
                NotificationDraft::new(
                    "u1",
                    NotificationKind::Appointment,
                    Priority::High,
                    "Cleaning",
                    "Tomorrow at 9",
                ),
                false,
            )
            .await
            .unwrap()
    };

    // 第二个"进程"：同一目录重新打开
    let store = JsonlStore::with_dir(dir.path());
    let records = store.list_recent("u1", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, outcome.id);
    assert_eq!(records[0].title, "Cleaning");
    assert_eq!(records[0].priority, Priority::High);
    assert!(!records[0].is_read);
}

#[tokio::test]
async fn test_read_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let id = {
        let store = JsonlStore::with_dir(dir.path());
        let r = NotificationDraft::new("u1", NotificationKind::System, Priority::Normal, "t", "m")
            .build(Utc::now())
            .unwrap();
        store.insert(&r).await.unwrap();
        assert!(store.mark_read(&r.id).await.unwrap());
        r.id
    };

    let store = JsonlStore::with_dir(dir.path());
    assert!(store.get(&id).await.unwrap().unwrap().is_read);
    assert_eq!(store.unread_count("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_preferences_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let store = Arc::new(JsonlStore::with_dir(dir.path()));
        let gate = PreferenceGate::new(store);
        gate.update(
            "u1",
            &PreferencesUpdate {
                email_enabled: Some(false),
                quiet_hours_start: Some("21:00".to_string()),
                ..Default::default()
            },
        )
        .await;
    }

    let store = Arc::new(JsonlStore::with_dir(dir.path()));
    let gate = PreferenceGate::new(store);
    let prefs = gate.load("u1").await;
    assert!(!prefs.email_enabled);
    assert_eq!(prefs.quiet_hours_start, "21:00");
    // 未触及的字段保持默认
    assert!(prefs.sms_enabled);
    assert_eq!(prefs.quiet_hours_end, "08:00");
}

#[tokio::test]
async fn test_sweep_over_durable_store() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::with_dir(dir.path());
    let now = Utc::now();

    let mut expired =
        NotificationDraft::new("u1", NotificationKind::Info, Priority::Low, "old", "m")
            .build(now)
            .unwrap();
    expired.expires_at = Some(now - ChronoDuration::days(2));
    let mut future =
        NotificationDraft::new("u1", NotificationKind::Info, Priority::Low, "later", "m")
            .build(now)
            .unwrap();
    future.expires_at = Some(now + ChronoDuration::days(2));
    let no_expiry =
        NotificationDraft::new("u1", NotificationKind::Info, Priority::Low, "forever", "m")
            .build(now)
            .unwrap();

    store.insert(&expired).await.unwrap();
    store.insert(&future).await.unwrap();
    store.insert(&no_expiry).await.unwrap();

    assert_eq!(sweeper::sweep(&store).await.unwrap(), 1);

    // 重启后的视图也只剩两条
    let reopened = JsonlStore::with_dir(dir.path());
    let titles: Vec<String> = reopened
        .list_recent("u1", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles.len(), 2);
    assert!(!titles.contains(&"old".to_string()));
}
