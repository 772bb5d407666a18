//! 表面一致性测试 - 缓存快照驱动中心 / 横幅 / 弹窗 / 角标

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use practice_notify::{
    banner_set, filter, toast_candidates, Dispatcher, FilterFacet, MemoryStore, NotificationCache,
    NotificationDraft, NotificationKind, NotificationStore, Priority,
};

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}

#[tokio::test]
async fn test_urgent_insert_reaches_all_surfaces() {
    let store = Arc::new(MemoryStore::new());
    let cache = NotificationCache::new(store.clone(), "u1");
    cache.load().await;

    let dispatcher = Dispatcher::new(store);
    dispatcher
        .create_notification(
            NotificationDraft::new(
                "u1",
                NotificationKind::Emergency,
                Priority::High,
                "Emergency",
                "Patient needs attention",
            ),
            false,
        )
        .await
        .unwrap();

    wait_for(|| cache.snapshot().notifications.len() == 1).await;
    wait_for(|| cache.snapshot().unread_count == 1).await;

    // 同一份快照同时满足三个表面的选取条件
    let snap = cache.snapshot();
    assert_eq!(filter(&snap.notifications, FilterFacet::Unread).len(), 1);
    assert_eq!(banner_set(&snap.notifications, 3).visible.len(), 1);
    assert_eq!(toast_candidates(&snap.notifications, Utc::now()).len(), 1);
    cache.close();
}

#[tokio::test]
async fn test_mark_read_dismisses_banner_but_keeps_center_entry() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(store.clone());
    let outcome = dispatcher
        .create_notification(
            NotificationDraft::new(
                "u1",
                NotificationKind::Emergency,
                Priority::High,
                "Emergency",
                "m",
            ),
            false,
        )
        .await
        .unwrap();

    let cache = NotificationCache::new(store, "u1");
    cache.load().await;
    assert_eq!(banner_set(&cache.snapshot().notifications, 3).visible.len(), 1);

    // 已读即从横幅消失，中心里仍然可见
    cache.mark_as_read(&outcome.id);
    let snap = cache.snapshot();
    assert!(banner_set(&snap.notifications, 3).visible.is_empty());
    assert_eq!(filter(&snap.notifications, FilterFacet::All).len(), 1);
    assert!(snap.notifications[0].is_read);

    wait_for(|| cache.snapshot().unread_count == 0).await;
    cache.close();
}

#[tokio::test]
async fn test_badge_watch_tracks_mark_all() {
    let store = Arc::new(MemoryStore::new());
    for i in 0..4 {
        let r = NotificationDraft::new(
            "u1",
            NotificationKind::System,
            Priority::Normal,
            &format!("n{}", i),
            "m",
        )
        .build(Utc::now())
        .unwrap();
        store.insert(&r).await.unwrap();
    }

    let cache = NotificationCache::new(store, "u1");
    cache.load().await;
    let rx = cache.watch_unread();
    assert_eq!(*rx.borrow(), 4);

    cache.mark_all_as_read();
    wait_for(|| *rx.borrow() == 0).await;
    cache.close();
}

#[tokio::test]
async fn test_normal_priority_never_banners_or_toasts() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(store.clone());
    dispatcher
        .create_notification(
            NotificationDraft::new(
                "u1",
                NotificationKind::Appointment,
                Priority::Normal,
                "Reminder",
                "Tomorrow at 9",
            ),
            false,
        )
        .await
        .unwrap();

    let cache = NotificationCache::new(store, "u1");
    cache.load().await;

    let snap = cache.snapshot();
    // 普通优先级只进中心和角标，不打断
    assert!(banner_set(&snap.notifications, 3).visible.is_empty());
    assert!(toast_candidates(&snap.notifications, Utc::now()).is_empty());
    assert_eq!(snap.unread_count, 1);
    cache.close();
}
