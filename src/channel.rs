//! 通知渠道 trait 定义
//!
//! 每个渠道独立实现、互不影响；渠道失败永远不会让
//! 已持久化的记录回滚（分发器负责隔离）。

use async_trait::async_trait;
use chrono::NaiveTime;

use crate::error::NotifyError;
use crate::model::Notification;
use crate::preferences::NotificationPreferences;

/// 单个渠道的发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（渠道关闭 / 分类关闭 / 免打扰时段）
    Skipped(String),
    /// 发送失败（渠道范围内，已隔离）
    Failed(String),
}

/// 通知渠道 trait
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志与结果归属）
    fn name(&self) -> &str;

    /// 偏好门控：该记录此刻是否应该走此渠道
    ///
    /// 返回 `Some(reason)` 表示跳过；持久化不在此处决定。
    fn skip_reason(
        &self,
        record: &Notification,
        prefs: &NotificationPreferences,
        local_time: NaiveTime,
    ) -> Option<String>;

    /// 发送记录到渠道
    async fn send(&self, record: &Notification) -> Result<(), NotifyError>;
}
