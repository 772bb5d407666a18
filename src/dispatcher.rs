//! 通知分发器 - 持久化 + 渠道扇出的编排与失败隔离
//!
//! 契约的核心不对称性：
//! 1. 验证 + 持久化是权威步骤，失败则整个操作失败，不尝试任何渠道；
//! 2. 渠道扇出是尽力而为，单个渠道失败被隔离为 `SendResult::Failed`
//!    出现在结果里，已持久化的记录绝不回滚。
//! 应用内通知是 system of record，email 只是增强。

use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::channel::{NotificationChannel, SendResult};
use crate::error::NotifyError;
use crate::model::{NotificationDraft, NotificationKind, Priority};
use crate::preferences::PreferenceGate;
use crate::store::NotificationStore;

/// 领域实体到 owner 的解析边界（外部协作方）
#[async_trait::async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn appointment_owner(&self, appointment_id: &str) -> Result<Option<String>, NotifyError>;
    async fn prescription_owner(&self, prescription_id: &str)
        -> Result<Option<String>, NotifyError>;
    async fn treatment_plan_owner(&self, plan_id: &str) -> Result<Option<String>, NotifyError>;
}

/// 一次创建操作的结果
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// 已持久化记录的 id
    pub id: String,
    /// 每个渠道的发送结果（渠道名, 结果）
    pub channels: Vec<(String, SendResult)>,
}

impl DispatchOutcome {
    /// 是否有渠道发送失败（次要信号，不代表操作失败）
    pub fn has_channel_failure(&self) -> bool {
        self.channels
            .iter()
            .any(|(_, r)| matches!(r, SendResult::Failed(_)))
    }
}

/// 通知分发器
pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    prefs: PreferenceGate,
    directory: Option<Arc<dyn EntityDirectory>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        let prefs = PreferenceGate::new(store.clone());
        Self {
            store,
            channels: Vec::new(),
            prefs,
            directory: None,
        }
    }

    /// 注册外发渠道
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = channel.name(), "registering notification channel");
        self.channels.push(channel);
    }

    /// 设置领域实体解析器（便捷操作需要）
    pub fn with_directory(mut self, directory: Arc<dyn EntityDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 创建通知：验证、持久化、渠道扇出
    ///
    /// `send_email=false` 时只持久化，不尝试任何外发渠道。
    pub async fn create_notification(
        &self,
        draft: NotificationDraft,
        send_email: bool,
    ) -> Result<DispatchOutcome, NotifyError> {
        // 第一步：权威持久化，失败直接传播
        let record = draft.build(Utc::now())?;
        self.store.insert(&record).await?;
        info!(
            notification_id = %record.id,
            owner = %record.owner,
            kind = %record.kind,
            priority = %record.priority,
            "notification persisted"
        );

        // 第二步：尽力而为的渠道扇出，逐渠道隔离
        let mut results = Vec::new();
        if send_email && !self.channels.is_empty() {
            let prefs = self.prefs.load(&record.owner).await;
            let local_time = Local::now().time();

            for channel in &self.channels {
                let name = channel.name().to_string();

                if let Some(reason) = channel.skip_reason(&record, &prefs, local_time) {
                    info!(channel = %name, notification_id = %record.id, reason = %reason, "channel skipped");
                    results.push((name, SendResult::Skipped(reason)));
                    continue;
                }

                match channel.send(&record).await {
                    Ok(()) => results.push((name, SendResult::Sent)),
                    Err(e) => {
                        // 渠道失败不回滚持久化结果
                        warn!(
                            channel = %name,
                            notification_id = %record.id,
                            error = %e,
                            "channel dispatch failed, record remains persisted"
                        );
                        results.push((name, SendResult::Failed(e.to_string())));
                    }
                }
            }
        }

        Ok(DispatchOutcome {
            id: record.id,
            channels: results,
        })
    }

    fn directory(&self) -> Result<&Arc<dyn EntityDirectory>, NotifyError> {
        self.directory
            .as_ref()
            .ok_or_else(|| NotifyError::Validation("no entity directory configured".to_string()))
    }

    /// 便捷操作：预约提醒
    pub async fn send_appointment_reminder(
        &self,
        appointment_id: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<DispatchOutcome, NotifyError> {
        let owner = self
            .directory()?
            .appointment_owner(appointment_id)
            .await?
            .ok_or_else(|| {
                NotifyError::Validation(format!("unknown appointment {}", appointment_id))
            })?;

        let draft = NotificationDraft::new(
            owner,
            NotificationKind::Appointment,
            Priority::Normal,
            "Upcoming appointment",
            format!(
                "You have an appointment scheduled for {}",
                starts_at.format("%Y-%m-%d %H:%M UTC")
            ),
        )
        .with_action_url(format!("/appointments/{}", appointment_id))
        .with_metadata_entry("appointment_id", serde_json::json!(appointment_id))
        // 提醒在预约开始后失去意义
        .with_expiry(starts_at);

        self.create_notification(draft, true).await
    }

    /// 便捷操作：处方通知
    pub async fn send_prescription_notice(
        &self,
        prescription_id: &str,
        note: &str,
    ) -> Result<DispatchOutcome, NotifyError> {
        let owner = self
            .directory()?
            .prescription_owner(prescription_id)
            .await?
            .ok_or_else(|| {
                NotifyError::Validation(format!("unknown prescription {}", prescription_id))
            })?;

        let draft = NotificationDraft::new(
            owner,
            NotificationKind::Prescription,
            Priority::Normal,
            "Prescription update",
            note,
        )
        .with_action_url(format!("/prescriptions/{}", prescription_id))
        .with_metadata_entry("prescription_id", serde_json::json!(prescription_id));

        self.create_notification(draft, true).await
    }

    /// 便捷操作：治疗方案通知
    pub async fn send_treatment_plan_notice(
        &self,
        plan_id: &str,
        note: &str,
    ) -> Result<DispatchOutcome, NotifyError> {
        let owner = self
            .directory()?
            .treatment_plan_owner(plan_id)
            .await?
            .ok_or_else(|| NotifyError::Validation(format!("unknown treatment plan {}", plan_id)))?;

        let draft = NotificationDraft::new(
            owner,
            NotificationKind::TreatmentPlan,
            Priority::Normal,
            "Treatment plan update",
            note,
        )
        .with_action_url(format!("/treatment-plans/{}", plan_id))
        .with_metadata_entry("plan_id", serde_json::json!(plan_id));

        self.create_notification(draft, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Notification;
    use crate::preferences::NotificationPreferences;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 测试用 mock 渠道
    struct MockChannel {
        name: String,
        send_count: AtomicUsize,
        fail: bool,
        skip: Option<String>,
    }

    impl MockChannel {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                send_count: AtomicUsize::new(0),
                fail: false,
                skip: None,
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }

        fn sends(&self) -> usize {
            self.send_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for MockChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn skip_reason(
            &self,
            _record: &Notification,
            _prefs: &NotificationPreferences,
            _local_time: NaiveTime,
        ) -> Option<String> {
            self.skip.clone()
        }

        async fn send(&self, _record: &Notification) -> Result<(), NotifyError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::ChannelDispatch(
                    crate::error::ChannelError::Relay("boom".to_string()),
                ))
            } else {
                Ok(())
            }
        }
    }

    struct StaticDirectory;

    #[async_trait]
    impl EntityDirectory for StaticDirectory {
        async fn appointment_owner(&self, id: &str) -> Result<Option<String>, NotifyError> {
            Ok((id == "apt-1").then(|| "patient-7".to_string()))
        }
        async fn prescription_owner(&self, id: &str) -> Result<Option<String>, NotifyError> {
            Ok((id == "rx-1").then(|| "patient-7".to_string()))
        }
        async fn treatment_plan_owner(&self, id: &str) -> Result<Option<String>, NotifyError> {
            Ok((id == "tp-1").then(|| "patient-7".to_string()))
        }
    }

    fn draft() -> NotificationDraft {
        NotificationDraft::new(
            "user-1",
            NotificationKind::System,
            Priority::Normal,
            "Test",
            "Hello",
        )
    }

    #[tokio::test]
    async fn test_create_persists_and_sends() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(MockChannel::new("email"));
        let mut dispatcher = Dispatcher::new(store.clone());
        dispatcher.register_channel(channel.clone());

        let outcome = dispatcher.create_notification(draft(), true).await.unwrap();

        assert!(store.get(&outcome.id).await.unwrap().is_some());
        assert_eq!(outcome.channels, vec![("email".to_string(), SendResult::Sent)]);
        assert_eq!(channel.sends(), 1);
        assert!(!outcome.has_channel_failure());
    }

    #[tokio::test]
    async fn test_send_email_false_skips_channels_entirely() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(MockChannel::new("email"));
        let mut dispatcher = Dispatcher::new(store.clone());
        dispatcher.register_channel(channel.clone());

        let outcome = dispatcher.create_notification(draft(), false).await.unwrap();

        assert!(store.get(&outcome.id).await.unwrap().is_some());
        assert!(outcome.channels.is_empty());
        assert_eq!(channel.sends(), 0);
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_roll_back_record() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = Dispatcher::new(store.clone());
        dispatcher.register_channel(Arc::new(MockChannel::failing("email")));

        let outcome = dispatcher.create_notification(draft(), true).await.unwrap();

        // 记录仍然存在，失败只出现在次要信号里
        assert!(store.get(&outcome.id).await.unwrap().is_some());
        assert!(outcome.has_channel_failure());
        assert!(matches!(outcome.channels[0].1, SendResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_validation_failure_attempts_no_channel() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(MockChannel::new("email"));
        let mut dispatcher = Dispatcher::new(store.clone());
        dispatcher.register_channel(channel.clone());

        let mut bad = draft();
        bad.title = String::new();
        let err = dispatcher.create_notification(bad, true).await.unwrap_err();

        assert!(matches!(err, NotifyError::Validation(_)));
        assert_eq!(channel.sends(), 0);
        assert_eq!(store.list_recent("user-1", 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_attempts_no_channel() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let channel = Arc::new(MockChannel::new("email"));
        let mut dispatcher = Dispatcher::new(store.clone());
        dispatcher.register_channel(channel.clone());

        let err = dispatcher.create_notification(draft(), true).await.unwrap_err();
        assert!(matches!(err, NotifyError::Persistence(_)));
        assert_eq!(channel.sends(), 0);
    }

    #[tokio::test]
    async fn test_skipped_channel_reported() {
        let store = Arc::new(MemoryStore::new());
        let mut channel = MockChannel::new("email");
        channel.skip = Some("quiet hours".to_string());
        let mut dispatcher = Dispatcher::new(store);
        dispatcher.register_channel(Arc::new(channel));

        let outcome = dispatcher.create_notification(draft(), true).await.unwrap();
        assert_eq!(
            outcome.channels[0].1,
            SendResult::Skipped("quiet hours".to_string())
        );
    }

    #[tokio::test]
    async fn test_appointment_reminder_resolves_owner() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher =
            Dispatcher::new(store.clone()).with_directory(Arc::new(StaticDirectory));

        let starts_at = Utc::now() + chrono::Duration::hours(24);
        let outcome = dispatcher
            .send_appointment_reminder("apt-1", starts_at)
            .await
            .unwrap();

        let record = store.get(&outcome.id).await.unwrap().unwrap();
        assert_eq!(record.owner, "patient-7");
        assert_eq!(record.kind, NotificationKind::Appointment);
        assert_eq!(record.expires_at, Some(starts_at));
        assert_eq!(record.metadata["appointment_id"], "apt-1");
        assert_eq!(record.action_url.as_deref(), Some("/appointments/apt-1"));
    }

    #[tokio::test]
    async fn test_unknown_entity_is_validation_error() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(store).with_directory(Arc::new(StaticDirectory));

        let err = dispatcher
            .send_prescription_notice("rx-missing", "note")
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_convenience_ops_for_prescription_and_plan() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher =
            Dispatcher::new(store.clone()).with_directory(Arc::new(StaticDirectory));

        let rx = dispatcher
            .send_prescription_notice("rx-1", "Refill ready")
            .await
            .unwrap();
        let tp = dispatcher
            .send_treatment_plan_notice("tp-1", "Plan updated")
            .await
            .unwrap();

        let rx_record = store.get(&rx.id).await.unwrap().unwrap();
        assert_eq!(rx_record.kind, NotificationKind::Prescription);
        assert_eq!(rx_record.message, "Refill ready");

        let tp_record = store.get(&tp.id).await.unwrap().unwrap();
        assert_eq!(tp_record.kind, NotificationKind::TreatmentPlan);
    }
}
