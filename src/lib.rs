//! Practice Notify - 诊所/门店管理应用的通知投递与呈现管线
//!
//! 一条领域事件从这里流过：分发器验证并持久化规范记录，
//! 按偏好与免打扰规则扇出到外发渠道（email），插入事件经
//! 变更流推进客户端缓存，呈现策略再把同一份缓存调和成
//! 通知中心 / 横幅 / 弹窗 / 未读角标四个表面。

pub mod cache;
pub mod channel;
pub mod channels;
pub mod cli;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod model;
pub mod preferences;
pub mod presentation;
pub mod store;
pub mod sweeper;

pub use cache::{CacheErrors, CacheSnapshot, NotificationCache, DEBOUNCE_WINDOW, DEFAULT_WINDOW};
pub use channel::{NotificationChannel, SendResult};
pub use channels::{
    EmailChannel, EmailRelay, EmailTemplate, HttpEmailRelay, OutboundEmail, OwnerProfile,
    ProfileResolver,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, EntityDirectory};
pub use error::{ChannelError, NotifyError};
pub use feed::{FeedClient, FeedSubscription};
pub use model::{Notification, NotificationDraft, NotificationKind, Priority};
pub use preferences::{NotificationPreferences, PreferenceGate, PreferencesUpdate};
pub use presentation::{
    auto_dismiss, banner_set, date_bucket, display_order, filter, group_by_date, search,
    sorted_for_display, toast_candidates, BannerSet, DateBucket, FilterFacet, TOAST_WINDOW,
};
pub use store::{JsonlStore, MemoryStore, NotificationStore, StoreEvent};
