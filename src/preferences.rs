//! 通知偏好设置 - 渠道开关、分类开关与免打扰时段
//!
//! 偏好记录按 owner 懒创建：第一次读取时返回完整默认值，
//! 消费方永远拿到完整记录，不需要处理 null / 部分字段。
//! 免打扰时段只抑制打扰型渠道（email/push），持久化永远不受影响。

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::model::{NotificationKind, Priority};

/// 每个 owner 一份的偏好记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub owner: String,
    // 渠道开关
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub in_app_enabled: bool,
    // 分类开关
    pub appointment_reminders: bool,
    pub prescription_updates: bool,
    pub treatment_plan_updates: bool,
    pub emergency_alerts: bool,
    pub system_notifications: bool,
    /// 免打扰开始时间 "HH:MM"
    pub quiet_hours_start: String,
    /// 免打扰结束时间 "HH:MM"（可跨午夜）
    pub quiet_hours_end: String,
}

impl NotificationPreferences {
    /// 默认偏好：所有渠道与分类开启，免打扰 22:00-08:00
    pub fn default_for(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            email_enabled: true,
            sms_enabled: true,
            push_enabled: true,
            in_app_enabled: true,
            appointment_reminders: true,
            prescription_updates: true,
            treatment_plan_updates: true,
            emergency_alerts: true,
            system_notifications: true,
            quiet_hours_start: "22:00".to_string(),
            quiet_hours_end: "08:00".to_string(),
        }
    }

    /// 指定 kind 的分类开关是否允许外发
    pub fn category_enabled(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Appointment | NotificationKind::FollowUp => {
                self.appointment_reminders
            }
            NotificationKind::Prescription => self.prescription_updates,
            NotificationKind::TreatmentPlan => self.treatment_plan_updates,
            NotificationKind::Emergency => self.emergency_alerts,
            _ => self.system_notifications,
        }
    }

    /// 当前时刻是否处于免打扰时段
    ///
    /// 窗口可跨午夜（如 22:00-08:00）。解析失败视为无免打扰。
    pub fn in_quiet_hours(&self, now: NaiveTime) -> bool {
        let (start, end) = match (
            parse_hhmm(&self.quiet_hours_start),
            parse_hhmm(&self.quiet_hours_end),
        ) {
            (Some(s), Some(e)) => (s, e),
            _ => return false,
        };

        if start == end {
            return false;
        }
        if start < end {
            now >= start && now < end
        } else {
            // 跨午夜
            now >= start || now < end
        }
    }

    /// 打扰型渠道此刻是否应被抑制
    ///
    /// High（urgent/emergency 级别）绕过免打扰。
    pub fn suppress_interruptive(&self, priority: Priority, now: NaiveTime) -> bool {
        priority != Priority::High && self.in_quiet_hours(now)
    }

    /// 应用部分更新，未提及的字段保持不变
    pub fn merged(&self, update: &PreferencesUpdate) -> Self {
        let mut next = self.clone();
        macro_rules! apply {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(v) = update.$field.clone() {
                    next.$field = v;
                })+
            };
        }
        apply!(
            email_enabled,
            sms_enabled,
            push_enabled,
            in_app_enabled,
            appointment_reminders,
            prescription_updates,
            treatment_plan_updates,
            emergency_alerts,
            system_notifications,
            quiet_hours_start,
            quiet_hours_end,
        );
        next
    }
}

/// 部分更新：None 表示保持原值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub in_app_enabled: Option<bool>,
    pub appointment_reminders: Option<bool>,
    pub prescription_updates: Option<bool>,
    pub treatment_plan_updates: Option<bool>,
    pub emergency_alerts: Option<bool>,
    pub system_notifications: Option<bool>,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
}

/// 解析 "HH:MM"
fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// 偏好门 - 懒创建默认值的读取与合并式更新
///
/// `load` 永远返回完整记录（读取失败回退默认值，只记 warn）。
/// `update` 在持久化失败时返回本地合并结果而不是报错：
/// UI 状态不应被瞬时写失败卡住。这是刻意的"尽力而为一致性"，
/// 不要改成 throw-on-error。
pub struct PreferenceGate {
    store: std::sync::Arc<dyn crate::store::NotificationStore>,
}

impl PreferenceGate {
    pub fn new(store: std::sync::Arc<dyn crate::store::NotificationStore>) -> Self {
        Self { store }
    }

    /// 读取偏好：已存储的记录，否则完整默认值
    pub async fn load(&self, owner: &str) -> NotificationPreferences {
        match self.store.load_preferences(owner).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => NotificationPreferences::default_for(owner),
            Err(e) => {
                tracing::warn!(owner, error = %e, "preference load failed, using defaults");
                NotificationPreferences::default_for(owner)
            }
        }
    }

    /// 合并部分更新并持久化
    ///
    /// 持久化失败时返回本地合并值（未持久化）。
    pub async fn update(
        &self,
        owner: &str,
        update: &PreferencesUpdate,
    ) -> NotificationPreferences {
        let merged = self.load(owner).await.merged(update);
        if let Err(e) = self.store.save_preferences(&merged).await {
            tracing::warn!(
                owner,
                error = %e,
                "preference persist failed, returning locally merged value"
            );
        }
        merged
    }
}
