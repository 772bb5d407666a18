//! Canonical notification record and priority classification
//!
//! The record is the system of record: outbound channels (email) are derived
//! effects of it, never sources of truth. Two historical priority
//! vocabularies ("urgent"/"high", "normal"/"medium") still arrive from older
//! callers; both are reconciled onto one ordinal scale at this boundary and
//! the original spelling is not kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::NotifyError;

/// Closed set of domain event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Appointment,
    Prescription,
    TreatmentPlan,
    FollowUp,
    Emergency,
    System,
    Payment,
    Warning,
    Error,
    Success,
    Info,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Appointment => "appointment",
            NotificationKind::Prescription => "prescription",
            NotificationKind::TreatmentPlan => "treatment_plan",
            NotificationKind::FollowUp => "follow_up",
            NotificationKind::Emergency => "emergency",
            NotificationKind::System => "system",
            NotificationKind::Payment => "payment",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
            NotificationKind::Success => "success",
            NotificationKind::Info => "info",
        }
    }

    /// Parse a wire spelling (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "appointment" => Some(NotificationKind::Appointment),
            "prescription" => Some(NotificationKind::Prescription),
            "treatment_plan" => Some(NotificationKind::TreatmentPlan),
            "follow_up" => Some(NotificationKind::FollowUp),
            "emergency" => Some(NotificationKind::Emergency),
            "system" => Some(NotificationKind::System),
            "payment" => Some(NotificationKind::Payment),
            "warning" => Some(NotificationKind::Warning),
            "error" => Some(NotificationKind::Error),
            "success" => Some(NotificationKind::Success),
            "info" => Some(NotificationKind::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordinal priority scale: High > Normal > Low
///
/// The integer rank is used for sort/tie-break only and is never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    /// Parse either historical vocabulary
    ///
    /// "urgent"/"high"/"error" map to High, "normal"/"medium" and the
    /// informational category spellings map to Normal, "low" to Low.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "urgent" | "high" | "error" => Some(Priority::High),
            "normal" | "medium" | "warning" | "info" | "success" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    /// Sort rank, higher is more urgent
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 2,
            Priority::Normal => 1,
            Priority::Low => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical notification record (persisted shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Opaque unique id, assigned at creation, immutable
    pub id: String,
    /// Recipient; all queries and feed subscriptions are scoped to it
    pub owner: String,
    pub kind: NotificationKind,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    /// Optional deep link; presence implies a "take action" affordance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    /// Open contextual payload (related entity ids, email override, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Monotonic: may only transition false -> true
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Whether the record is past its expiry at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }

    /// Destination override carried in metadata, if any
    pub fn email_override(&self) -> Option<&str> {
        self.metadata.get("email").and_then(|v| v.as_str())
    }
}

/// Creation input, validated into a canonical record
///
/// Pure construction: no side effects, no id/timestamp until `build`.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub owner: String,
    pub kind: NotificationKind,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NotificationDraft {
    pub fn new(
        owner: impl Into<String>,
        kind: NotificationKind,
        priority: Priority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            kind,
            priority,
            title: title.into(),
            message: message.into(),
            action_url: None,
            metadata: BTreeMap::new(),
            expires_at: None,
        }
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Validate and produce the canonical record
    ///
    /// Fails when title/message are empty (after trimming), the owner is
    /// blank, or `expires_at` is not strictly after `now`.
    pub fn build(self, now: DateTime<Utc>) -> Result<Notification, NotifyError> {
        if self.owner.trim().is_empty() {
            return Err(NotifyError::Validation("owner is empty".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(NotifyError::Validation("title is empty".to_string()));
        }
        if self.message.trim().is_empty() {
            return Err(NotifyError::Validation("message is empty".to_string()));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(NotifyError::Validation(format!(
                    "expires_at {} is not in the future",
                    expires_at
                )));
            }
        }

        Ok(Notification {
            id: uuid::Uuid::new_v4().to_string(),
            owner: self.owner,
            kind: self.kind,
            priority: self.priority,
            title: self.title,
            message: self.message,
            action_url: self.action_url,
            metadata: self.metadata,
            is_read: false,
            created_at: now,
            expires_at: self.expires_at,
        })
    }
}
