//! JSONL 持久化存储 - 本地文件 + 文件锁 + 原子重写
//!
//! 记录按行追加到 `notifications.jsonl`，写入时持有 fs2 排他锁；
//! 任何就地变更（标记已读、删除、清扫）都走"重写临时文件 + 原子 rename"。
//! 偏好设置放在旁路文件 `prefs.json`（owner -> 记录的 JSON map）。
//!
//! 文件是 system of record：收缩只丢弃已过期或已读的记录，
//! 未读且未过期的记录只会被清扫器（过期）或显式删除移除。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::warn;

use super::{NotificationStore, StoreEvent};
use crate::error::NotifyError;
use crate::model::Notification;
use crate::preferences::NotificationPreferences;

const FEED_CAPACITY: usize = 256;
/// 超过该行数时触发清理
const MAX_RECORDS: usize = 2000;
/// 清理的目标行数（未读记录多于该值时可以超出）
const KEEP_AFTER_CLEANUP: usize = 1000;
/// 每写入多少条检查一次是否需要清理
const CLEANUP_CHECK_INTERVAL: usize = 50;

/// JSONL 存储
pub struct JsonlStore {
    dir: PathBuf,
    feed: broadcast::Sender<StoreEvent>,
    writes_since_check: AtomicUsize,
}

impl JsonlStore {
    /// 默认数据目录 ~/.config/practice-notify
    pub fn new() -> Self {
        let dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("practice-notify");
        Self::with_dir(dir)
    }

    /// 指定数据目录（测试用 tempdir）
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            dir: dir.into(),
            feed,
            writes_since_check: AtomicUsize::new(0),
        }
    }

    fn records_path(&self) -> PathBuf {
        self.dir.join("notifications.jsonl")
    }

    fn prefs_path(&self) -> PathBuf {
        self.dir.join("prefs.json")
    }

    fn persistence_err(e: impl std::fmt::Display) -> NotifyError {
        NotifyError::Persistence(e.to_string())
    }

    /// 读取全部记录（解析失败的行跳过）
    fn read_all(&self) -> Result<Vec<Notification>, NotifyError> {
        let path = self.records_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(Self::persistence_err)?;
        let reader = BufReader::new(file);
        Ok(reader
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect())
    }

    /// 在排他锁下重写整个文件（临时文件 + 原子 rename）
    fn rewrite_all(&self, records: &[Notification]) -> Result<(), NotifyError> {
        let path = self.records_path();
        fs::create_dir_all(&self.dir).map_err(Self::persistence_err)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Self::persistence_err)?;
        lock_file.lock_exclusive().map_err(Self::persistence_err)?;

        let temp_path = path.with_extension("tmp");
        {
            let mut temp = File::create(&temp_path).map_err(Self::persistence_err)?;
            for record in records {
                let line = serde_json::to_string(record).map_err(Self::persistence_err)?;
                writeln!(temp, "{}", line).map_err(Self::persistence_err)?;
            }
        }
        fs::rename(&temp_path, &path).map_err(Self::persistence_err)?;

        lock_file.unlock().map_err(Self::persistence_err)?;
        Ok(())
    }

    /// 记录数超限时收缩文件：先丢已过期的，再按最旧优先丢已读的
    ///
    /// 未读且未过期的记录永远不会被收缩丢弃（它们只能被清扫器
    /// 或显式删除移除），所以目标行数是软上限。
    fn maybe_compact(&self, records: &mut Vec<Notification>, now: DateTime<Utc>) -> bool {
        if records.len() <= MAX_RECORDS {
            return false;
        }
        let before = records.len();
        records.retain(|r| !r.is_expired(now));

        if records.len() > KEEP_AFTER_CLEANUP {
            records.sort_by_key(|r| r.created_at);
            let mut excess = records.len() - KEEP_AFTER_CLEANUP;
            records.retain(|r| {
                if excess > 0 && r.is_read {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
        records.len() < before
    }

    fn read_prefs_map(&self) -> Result<HashMap<String, NotificationPreferences>, NotifyError> {
        let path = self.prefs_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&path).map_err(Self::persistence_err)?;
        serde_json::from_str(&content).map_err(Self::persistence_err)
    }

    fn write_prefs_map(
        &self,
        map: &HashMap<String, NotificationPreferences>,
    ) -> Result<(), NotifyError> {
        fs::create_dir_all(&self.dir).map_err(Self::persistence_err)?;
        let path = self.prefs_path();
        let temp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(map).map_err(Self::persistence_err)?;
        fs::write(&temp_path, content).map_err(Self::persistence_err)?;
        fs::rename(&temp_path, &path).map_err(Self::persistence_err)?;
        Ok(())
    }
}

impl Default for JsonlStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for JsonlStore {
    async fn insert(&self, record: &Notification) -> Result<(), NotifyError> {
        let path = self.records_path();
        fs::create_dir_all(&self.dir).map_err(Self::persistence_err)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Self::persistence_err)?;
        file.lock_exclusive().map_err(Self::persistence_err)?;
        let mut file = file;
        let line = serde_json::to_string(record).map_err(Self::persistence_err)?;
        let write_result = writeln!(file, "{}", line).map_err(Self::persistence_err);
        file.unlock().map_err(Self::persistence_err)?;
        write_result?;

        // 每 CLEANUP_CHECK_INTERVAL 次写入检查一次收缩，
        // 失败只警告不影响写入结果
        let writes = self.writes_since_check.fetch_add(1, Ordering::SeqCst) + 1;
        if writes >= CLEANUP_CHECK_INTERVAL {
            self.writes_since_check.store(0, Ordering::SeqCst);
            match self.read_all() {
                Ok(mut records) => {
                    if self.maybe_compact(&mut records, Utc::now()) {
                        if let Err(e) = self.rewrite_all(&records) {
                            warn!(error = %e, "notification store compaction failed");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "notification store compaction check failed"),
            }
        }

        let _ = self.feed.send(StoreEvent::Inserted(record.clone()));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Notification>, NotifyError> {
        Ok(self.read_all()?.into_iter().find(|r| r.id == id))
    }

    async fn list_recent(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, NotifyError> {
        let mut owned: Vec<Notification> = self
            .read_all()?
            .into_iter()
            .filter(|r| r.owner == owner)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn unread_count(&self, owner: &str) -> Result<usize, NotifyError> {
        Ok(self
            .read_all()?
            .iter()
            .filter(|r| r.owner == owner && !r.is_read)
            .count())
    }

    async fn mark_read(&self, id: &str) -> Result<bool, NotifyError> {
        let mut records = self.read_all()?;
        let mut changed = false;
        for record in records.iter_mut() {
            if record.id == id && !record.is_read {
                record.is_read = true;
                changed = true;
            }
        }
        if changed {
            self.rewrite_all(&records)?;
        }
        Ok(changed)
    }

    async fn mark_all_read(&self, owner: &str) -> Result<usize, NotifyError> {
        let mut records = self.read_all()?;
        let mut changed = 0;
        for record in records.iter_mut().filter(|r| r.owner == owner && !r.is_read) {
            record.is_read = true;
            changed += 1;
        }
        if changed > 0 {
            self.rewrite_all(&records)?;
        }
        Ok(changed)
    }

    async fn delete(&self, id: &str) -> Result<bool, NotifyError> {
        let mut records = self.read_all()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() < before {
            self.rewrite_all(&records)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, NotifyError> {
        let mut records = self.read_all()?;
        let before = records.len();
        records.retain(|r| !r.is_expired(now));
        let removed = before - records.len();
        if removed > 0 {
            self.rewrite_all(&records)?;
        }
        Ok(removed)
    }

    async fn load_preferences(
        &self,
        owner: &str,
    ) -> Result<Option<NotificationPreferences>, NotifyError> {
        Ok(self.read_prefs_map()?.get(owner).cloned())
    }

    async fn save_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> Result<(), NotifyError> {
        let mut map = self.read_prefs_map()?;
        map.insert(prefs.owner.clone(), prefs.clone());
        self.write_prefs_map(&map)
    }

    fn change_feed(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }
}
