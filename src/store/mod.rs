//! 存储边界 - 持久化引擎视为外部协作方
//!
//! 管线只依赖这里定义的 trait：查询能力 + 插入事件变更流。
//! `MemoryStore` 供测试与 watch 模式使用，`JsonlStore` 是随附的
//! 本地持久化实现（JSONL + 文件锁 + 原子重写）。

pub mod jsonl;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::error::NotifyError;
use crate::model::Notification;
use crate::preferences::NotificationPreferences;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// 变更流事件（本设计只消费插入事件）
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Inserted(Notification),
}

/// 持久化存储边界
///
/// 所有查询按 owner 作用域；`mark_read` 单向（false -> true），
/// `delete` 是终态删除，与已读状态无关。
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// 持久化一条已验证的规范记录，并向变更流发布插入事件
    async fn insert(&self, record: &Notification) -> Result<(), NotifyError>;

    async fn get(&self, id: &str) -> Result<Option<Notification>, NotifyError>;

    /// 最近 N 条（最新在前）
    async fn list_recent(&self, owner: &str, limit: usize)
        -> Result<Vec<Notification>, NotifyError>;

    async fn unread_count(&self, owner: &str) -> Result<usize, NotifyError>;

    /// 标记已读；返回是否真的发生了状态变化（幂等）
    async fn mark_read(&self, id: &str) -> Result<bool, NotifyError>;

    /// 标记 owner 的全部记录已读，返回变化条数
    async fn mark_all_read(&self, owner: &str) -> Result<usize, NotifyError>;

    /// 用户显式删除（终态、不可逆）
    async fn delete(&self, id: &str) -> Result<bool, NotifyError>;

    /// 删除所有 expires_at 已过期的记录，返回删除条数
    ///
    /// 幂等；不碰没有 expires_at 的记录。
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, NotifyError>;

    async fn load_preferences(
        &self,
        owner: &str,
    ) -> Result<Option<NotificationPreferences>, NotifyError>;

    async fn save_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> Result<(), NotifyError>;

    /// 订阅变更流（只含插入事件，未过滤 owner）
    fn change_feed(&self) -> broadcast::Receiver<StoreEvent>;
}
