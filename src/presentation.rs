//! Presentation policy for the three rendering surfaces
//!
//! Center, banner and toast all consume the same cache snapshot; the policy
//! here is pure so the surfaces can never disagree on read state. Shared
//! ordering rule: priority rank descending, ties broken by `created_at`
//! descending (newest first).

use chrono::{DateTime, Datelike, Duration, Local, Utc};
use std::cmp::Ordering;

use crate::model::{Notification, NotificationKind, Priority};

/// Toast recency window: records older than this never toast,
/// so page loads do not replay history.
pub const TOAST_WINDOW: Duration = Duration::seconds(10);

/// Shared comparator: priority rank descending, then newest first
pub fn display_order(a: &Notification, b: &Notification) -> Ordering {
    b.priority
        .rank()
        .cmp(&a.priority.rank())
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Sort a slice of references into display order
pub fn sorted_for_display<'a>(items: &'a [Notification]) -> Vec<&'a Notification> {
    let mut refs: Vec<&Notification> = items.iter().collect();
    refs.sort_by(|a, b| display_order(a, b));
    refs
}

// ── Center ───────────────────────────────────────────────────

/// Filter facets offered by the notification center
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterFacet {
    All,
    Unread,
    Urgent,
    ByKind(NotificationKind),
}

/// Case-insensitive substring search over title, message and kind
pub fn search<'a>(items: &'a [Notification], query: &str) -> Vec<&'a Notification> {
    let query = query.to_lowercase();
    if query.is_empty() {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|n| {
            n.title.to_lowercase().contains(&query)
                || n.message.to_lowercase().contains(&query)
                || n.kind.as_str().contains(&query)
        })
        .collect()
}

pub fn filter<'a>(items: &'a [Notification], facet: FilterFacet) -> Vec<&'a Notification> {
    items
        .iter()
        .filter(|n| match facet {
            FilterFacet::All => true,
            FilterFacet::Unread => !n.is_read,
            FilterFacet::Urgent => n.priority == Priority::High,
            FilterFacet::ByKind(kind) => n.kind == kind,
        })
        .collect()
}

/// Date buckets for the grouped center view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBucket {
    Today,
    Yesterday,
    ThisWeek,
    Earlier,
}

impl DateBucket {
    pub fn label(&self) -> &'static str {
        match self {
            DateBucket::Today => "Today",
            DateBucket::Yesterday => "Yesterday",
            DateBucket::ThisWeek => "This Week",
            DateBucket::Earlier => "Earlier",
        }
    }
}

/// Bucket for a record created at `created_at`, relative to the local
/// midnight boundaries of `now`
pub fn date_bucket(created_at: DateTime<Utc>, now: DateTime<Local>) -> DateBucket {
    let created = created_at.with_timezone(&now.timezone()).date_naive();
    let today = now.date_naive();

    if created == today {
        DateBucket::Today
    } else if today.pred_opt() == Some(created) {
        DateBucket::Yesterday
    } else if created.iso_week() == today.iso_week() && created.year() == today.year() {
        DateBucket::ThisWeek
    } else {
        DateBucket::Earlier
    }
}

/// Group into date buckets, bucket order fixed, empty buckets omitted
pub fn group_by_date<'a>(
    items: &'a [Notification],
    now: DateTime<Local>,
) -> Vec<(DateBucket, Vec<&'a Notification>)> {
    let buckets = [
        DateBucket::Today,
        DateBucket::Yesterday,
        DateBucket::ThisWeek,
        DateBucket::Earlier,
    ];
    buckets
        .into_iter()
        .filter_map(|bucket| {
            let members: Vec<&Notification> = items
                .iter()
                .filter(|n| date_bucket(n.created_at, now) == bucket)
                .collect();
            (!members.is_empty()).then_some((bucket, members))
        })
        .collect()
}

// ── Banner ───────────────────────────────────────────────────

/// Banner contents: visible slice plus overflow indicator
#[derive(Debug, Clone)]
pub struct BannerSet<'a> {
    pub visible: Vec<&'a Notification>,
    pub overflow: usize,
}

impl BannerSet<'_> {
    /// "+N more" label, absent when everything fits
    pub fn overflow_label(&self) -> Option<String> {
        (self.overflow > 0).then(|| format!("+{} more", self.overflow))
    }
}

/// Select banner records: unread AND high priority only, display order,
/// capped at `max_visible`
///
/// Dismissal is a cache concern (mark as read removes the record from the
/// banner set but not from the center).
pub fn banner_set(items: &[Notification], max_visible: usize) -> BannerSet<'_> {
    let mut eligible: Vec<&Notification> = items
        .iter()
        .filter(|n| !n.is_read && n.priority == Priority::High)
        .collect();
    eligible.sort_by(|a, b| display_order(a, b));

    let overflow = eligible.len().saturating_sub(max_visible);
    eligible.truncate(max_visible);
    BannerSet {
        visible: eligible,
        overflow,
    }
}

// ── Toast ────────────────────────────────────────────────────

/// Toast candidates: high priority only, created within the recency window
pub fn toast_candidates<'a>(
    items: &'a [Notification],
    now: DateTime<Utc>,
) -> Vec<&'a Notification> {
    let mut eligible: Vec<&Notification> = items
        .iter()
        .filter(|n| {
            !n.is_read
                && n.priority == Priority::High
                && now.signed_duration_since(n.created_at) <= TOAST_WINDOW
                && n.created_at <= now
        })
        .collect();
    eligible.sort_by(|a, b| display_order(a, b));
    eligible
}

/// Auto-dismiss duration per priority: the most time-sensitive category is
/// manual-dismiss only
pub fn auto_dismiss(priority: Priority) -> Option<std::time::Duration> {
    match priority {
        Priority::High => None,
        Priority::Normal => Some(std::time::Duration::from_secs(5)),
        Priority::Low => Some(std::time::Duration::from_secs(3)),
    }
}
