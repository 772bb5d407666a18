//! 错误类型定义 - 区分持久化失败与渠道失败
//!
//! 传播规则：
//! - `Validation` / `Persistence` 必须传播给调用方（操作失败）
//! - `ChannelDispatch` 只作为次要信号出现在 `DispatchOutcome` 中，
//!   永远不会让已持久化的记录回滚
//! - `Subscription` 降级为"无实时更新"，写入缓存的 error slot
//! - `PreferenceLoad` 回退到默认偏好设置，只记录 warn 日志

use thiserror::Error;

/// 渠道范围内的错误（email 等外发渠道）
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    /// 找不到收件人档案
    #[error("profile not found for owner {0}")]
    ProfileNotFound(String),
    /// 档案存在但没有可用地址
    #[error("no deliverable address for owner {0}")]
    NoAddress(String),
    /// 外部中继调用失败
    #[error("relay failure: {0}")]
    Relay(String),
}

/// 通知管线的统一错误类型
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 创建输入不合法（不重试）
    #[error("validation failed: {0}")]
    Validation(String),

    /// 存储不可用，操作整体失败
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// 渠道发送失败（已隔离，不影响持久化结果）
    #[error("channel dispatch failed: {0}")]
    ChannelDispatch(#[from] ChannelError),

    /// 变更流订阅建立失败
    #[error("subscription failure: {0}")]
    Subscription(String),

    /// 偏好设置加载失败（调用方应回退到默认值）
    #[error("preference load failure: {0}")]
    PreferenceLoad(String),
}

impl NotifyError {
    /// 是否属于渠道范围（不应作为操作失败传播）
    pub fn is_channel_scoped(&self) -> bool {
        matches!(self, NotifyError::ChannelDispatch(_))
    }
}
