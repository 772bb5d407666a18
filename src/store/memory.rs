//! 内存存储 - 测试与 watch 模式使用的参考实现
//!
//! 带读/写失败开关（`set_fail_reads` / `set_fail_writes`），
//! 用于在测试里演练"乐观更新不回滚"、"偏好更新本地回退"
//! 与"部分加载失败不阻塞其他槽位"三条路径。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};

use super::{NotificationStore, StoreEvent};
use crate::error::NotifyError;
use crate::model::Notification;
use crate::preferences::NotificationPreferences;

const FEED_CAPACITY: usize = 256;

/// 内存存储
pub struct MemoryStore {
    records: RwLock<Vec<Notification>>,
    preferences: RwLock<HashMap<String, NotificationPreferences>>,
    feed: broadcast::Sender<StoreEvent>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            records: RwLock::new(Vec::new()),
            preferences: RwLock::new(HashMap::new()),
            feed,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// 让后续写操作失败（测试用）
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 让后续读操作失败（测试用）
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), NotifyError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(NotifyError::Persistence("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_readable(&self) -> Result<(), NotifyError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(NotifyError::Persistence("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, record: &Notification) -> Result<(), NotifyError> {
        self.check_writable()?;
        self.records.write().await.push(record.clone());
        // 没有订阅者时发送失败是正常情况
        let _ = self.feed.send(StoreEvent::Inserted(record.clone()));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Notification>, NotifyError> {
        self.check_readable()?;
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list_recent(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, NotifyError> {
        self.check_readable()?;
        let records = self.records.read().await;
        let mut owned: Vec<Notification> = records
            .iter()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn unread_count(&self, owner: &str) -> Result<usize, NotifyError> {
        self.check_readable()?;
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.owner == owner && !r.is_read)
            .count())
    }

    async fn mark_read(&self, id: &str) -> Result<bool, NotifyError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) if !record.is_read => {
                record.is_read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, owner: &str) -> Result<usize, NotifyError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let mut changed = 0;
        for record in records.iter_mut().filter(|r| r.owner == owner && !r.is_read) {
            record.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete(&self, id: &str) -> Result<bool, NotifyError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, NotifyError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !r.is_expired(now));
        Ok(before - records.len())
    }

    async fn load_preferences(
        &self,
        owner: &str,
    ) -> Result<Option<NotificationPreferences>, NotifyError> {
        self.check_readable()?;
        Ok(self.preferences.read().await.get(owner).cloned())
    }

    async fn save_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> Result<(), NotifyError> {
        self.check_writable()?;
        self.preferences
            .write()
            .await
            .insert(prefs.owner.clone(), prefs.clone());
        Ok(())
    }

    fn change_feed(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationDraft, NotificationKind, Priority};
    use chrono::Duration;

    fn record(owner: &str, title: &str) -> Notification {
        NotificationDraft::new(owner, NotificationKind::System, Priority::Normal, title, "m")
            .build(Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_roundtrip() {
        let store = MemoryStore::new();
        let r = record("u1", "hello");
        store.insert(&r).await.unwrap();

        let fetched = store.get(&r.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "hello");
        assert_eq!(fetched.kind, r.kind);
        assert_eq!(fetched.priority, r.priority);
    }

    #[tokio::test]
    async fn test_list_recent_is_owner_scoped_and_ordered() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (i, owner) in [(0, "u1"), (1, "u1"), (2, "u2")] {
            let mut r = record(owner, &format!("n{}", i));
            r.created_at = now + Duration::seconds(i);
            store.insert(&r).await.unwrap();
        }

        let listed = store.list_recent("u1", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "n1"); // 最新在前
        assert_eq!(listed[1].title, "n0");
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let store = MemoryStore::new();
        let r = record("u1", "t");
        store.insert(&r).await.unwrap();

        assert!(store.mark_read(&r.id).await.unwrap());
        assert!(!store.mark_read(&r.id).await.unwrap());
        assert!(!store.mark_read("missing").await.unwrap());
        assert_eq!(store.unread_count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_only_removes_expired() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut expired = record("u1", "old");
        expired.expires_at = Some(now - Duration::days(1));
        let keeper = record("u1", "keep");
        store.insert(&expired).await.unwrap();
        store.insert(&keeper).await.unwrap();

        assert_eq!(store.sweep_expired(now).await.unwrap(), 1);
        // 幂等
        assert_eq!(store.sweep_expired(now).await.unwrap(), 0);
        assert!(store.get(&keeper.id).await.unwrap().is_some());
        assert!(store.get(&expired.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_feed_delivers_inserts() {
        let store = MemoryStore::new();
        let mut feed = store.change_feed();
        let r = record("u1", "live");
        store.insert(&r).await.unwrap();

        let StoreEvent::Inserted(got) = feed.recv().await.unwrap();
        assert_eq!(got.id, r.id);
    }

    #[tokio::test]
    async fn test_fail_writes_surfaces_persistence_error() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.insert(&record("u1", "t")).await.unwrap_err();
        assert!(matches!(err, NotifyError::Persistence(_)));
    }
}
