//! Email 渠道 - 记录到外发邮件的映射与中继调用
//!
//! kind 映射到一组封闭的邮件模板；目的地址优先取
//! `metadata.email` 覆盖值，否则取档案中的地址。三种失败
//! （无档案 / 无地址 / 中继失败）都是渠道范围错误，
//! 永远不会作为持久化失败传播。

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::channel::NotificationChannel;
use crate::error::{ChannelError, NotifyError};
use crate::model::{Notification, NotificationKind};
use crate::preferences::NotificationPreferences;

/// 封闭的邮件模板集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    AppointmentConfirmation,
    Prescription,
    TreatmentPlan,
    System,
}

impl EmailTemplate {
    /// kind -> 模板（默认 System）
    pub fn for_kind(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Appointment | NotificationKind::FollowUp => {
                EmailTemplate::AppointmentConfirmation
            }
            NotificationKind::Prescription => EmailTemplate::Prescription,
            NotificationKind::TreatmentPlan => EmailTemplate::TreatmentPlan,
            _ => EmailTemplate::System,
        }
    }
}

/// 收件人档案（由外部解析，管线只消费）
#[derive(Debug, Clone)]
pub struct OwnerProfile {
    pub owner: String,
    pub display_name: String,
    pub email: Option<String>,
}

/// 档案解析边界
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// 找不到档案时返回 Ok(None)
    async fn resolve(&self, owner: &str) -> Result<Option<OwnerProfile>, NotifyError>;
}

/// 外发邮件（中继接口的载荷）
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub template: EmailTemplate,
    /// 关联 id：通知 id 与 owner，供中继侧排障
    pub notification_id: String,
    pub owner: String,
}

/// 邮件中继边界
#[async_trait]
pub trait EmailRelay: Send + Sync {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), ChannelError>;
}

/// HTTP 中继：把外发邮件 POST 给中继服务
pub struct HttpEmailRelay {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmailRelay {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("practice-notify/0.1")
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EmailRelay for HttpEmailRelay {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(email)
            .send()
            .await
            .map_err(|e| ChannelError::Relay(e.to_string()))?;

        if resp.status().is_success() {
            info!(
                to = %email.to,
                notification_id = %email.notification_id,
                "email relay accepted message"
            );
            Ok(())
        } else {
            Err(ChannelError::Relay(format!(
                "relay returned status {}",
                resp.status()
            )))
        }
    }
}

/// Email 渠道
pub struct EmailChannel {
    profiles: Arc<dyn ProfileResolver>,
    relay: Arc<dyn EmailRelay>,
}

impl EmailChannel {
    pub fn new(profiles: Arc<dyn ProfileResolver>, relay: Arc<dyn EmailRelay>) -> Self {
        Self { profiles, relay }
    }

    /// 解析目的地址：metadata.email 覆盖优先于档案地址
    async fn resolve_address(&self, record: &Notification) -> Result<String, ChannelError> {
        if let Some(addr) = record.email_override() {
            debug!(notification_id = %record.id, "using metadata email override");
            return Ok(addr.to_string());
        }

        let profile = self
            .profiles
            .resolve(&record.owner)
            .await
            .map_err(|e| ChannelError::Relay(e.to_string()))?
            .ok_or_else(|| ChannelError::ProfileNotFound(record.owner.clone()))?;

        profile
            .email
            .filter(|addr| !addr.trim().is_empty())
            .ok_or_else(|| ChannelError::NoAddress(record.owner.clone()))
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn skip_reason(
        &self,
        record: &Notification,
        prefs: &NotificationPreferences,
        local_time: NaiveTime,
    ) -> Option<String> {
        if !prefs.email_enabled {
            return Some("email channel disabled".to_string());
        }
        if !prefs.category_enabled(record.kind) {
            return Some(format!("category {} disabled", record.kind));
        }
        if prefs.suppress_interruptive(record.priority, local_time) {
            return Some("quiet hours".to_string());
        }
        None
    }

    async fn send(&self, record: &Notification) -> Result<(), NotifyError> {
        let to = match self.resolve_address(record).await {
            Ok(addr) => addr,
            Err(e) => {
                warn!(
                    notification_id = %record.id,
                    owner = %record.owner,
                    error = %e,
                    "email address resolution failed"
                );
                return Err(NotifyError::ChannelDispatch(e));
            }
        };

        let email = OutboundEmail {
            to,
            subject: record.title.clone(),
            body: record.message.clone(),
            template: EmailTemplate::for_kind(record.kind),
            notification_id: record.id.clone(),
            owner: record.owner.clone(),
        };

        self.relay
            .deliver(&email)
            .await
            .map_err(NotifyError::ChannelDispatch)
    }
}
