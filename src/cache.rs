//! 客户端缓存 - 每个会话的单一事实来源
//!
//! 通知中心、横幅、弹窗、未读角标四个表面都从这里读取，
//! 所有变更（乐观已读、实时插入、偏好更新）都经过这里串行化，
//! 表面之间永远不会看到分歧的已读状态。
//!
//! 未读角标跟踪的是存储侧的未读总数（可能大于缓存窗口），
//! 初始加载取一次权威计数，之后靠本地增量维护（实时插入 +1、
//! 标记已读 -1、全部已读归零），`load`/`refresh` 时从存储对账。
//! 计数通过 ~100ms 防抖窗口发布（`tokio::sync::watch`），
//! 避免事件密集时角标抖动；防抖任务与订阅都在 `close` 时
//! 确定性拆除，反复挂载/卸载不泄漏定时器或任务。
//!
//! 一个缓存只持有一份引用计数的变更流订阅，多个表面复用，
//! 不允许每个表面各开一条连接。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::NotifyError;
use crate::feed::{FeedClient, FeedSubscription};
use crate::model::Notification;
use crate::preferences::{NotificationPreferences, PreferenceGate, PreferencesUpdate};
use crate::store::NotificationStore;

/// 缓存的通知窗口上限（最近 N 条）
pub const DEFAULT_WINDOW: usize = 50;
/// 未读计数防抖窗口
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// 每个数据槽独立的错误状态：一项失败不阻塞其他项
#[derive(Debug, Clone, Default)]
pub struct CacheErrors {
    pub notifications: Option<String>,
    pub unread_count: Option<String>,
    pub preferences: Option<String>,
    pub subscription: Option<String>,
}

/// 表面读取用的一致性快照
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    /// 最新在前，窗口上限内
    pub notifications: Vec<Notification>,
    /// 防抖后发布的未读计数
    pub unread_count: usize,
    pub preferences: NotificationPreferences,
    pub loading: bool,
    pub errors: CacheErrors,
}

struct CacheState {
    notifications: Vec<Notification>,
    /// 存储侧未读总数（增量维护，load/refresh 时对账）
    unread_total: usize,
    preferences: NotificationPreferences,
    loading: bool,
    errors: CacheErrors,
}

struct CacheInner {
    owner: String,
    window: usize,
    store: Arc<dyn NotificationStore>,
    gate: PreferenceGate,
    state: Mutex<CacheState>,
    unread_tx: watch::Sender<usize>,
    unread_rx: watch::Receiver<usize>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<FeedSubscription>>,
    closed: AtomicBool,
}

impl CacheInner {
    /// 立即发布未读计数（初始加载用，不走防抖）
    fn publish_unread_now(&self) {
        let total = self.state.lock().unwrap().unread_total;
        let _ = self.unread_tx.send(total);
    }

    /// 调度一次防抖的未读计数发布；窗口内的多次调用合并
    fn schedule_unread_publish(self: &Arc<Self>) {
        let mut slot = self.debounce.lock().unwrap();
        // close 先置标志再清槽位：closed 必须在持有槽位锁时检查，
        // 否则可能在 close 清空之后装入新定时器
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            // 已有待触发的定时器，本次合并进去
            return;
        }
        let inner = self.clone();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE_WINDOW).await;
            if !inner.closed.load(Ordering::SeqCst) {
                inner.publish_unread_now();
            }
        }));
    }

    /// 实时插入：前插 + 截断窗口 + 未读则计数 +1 并调度发布
    fn apply_insert(self: &Arc<Self>, record: Notification) {
        let is_unread = !record.is_read;
        {
            let mut state = self.state.lock().unwrap();
            state.notifications.insert(0, record);
            state.notifications.truncate(self.window);
            if is_unread {
                state.unread_total += 1;
            }
        }
        if is_unread {
            self.schedule_unread_publish();
        }
    }
}

/// 客户端缓存（可克隆，克隆共享同一会话状态）
#[derive(Clone)]
pub struct NotificationCache {
    inner: Arc<CacheInner>,
}

impl NotificationCache {
    /// 建立缓存并接上共享订阅（尚未加载数据，调用 `load`）
    pub fn new(store: Arc<dyn NotificationStore>, owner: impl Into<String>) -> Self {
        Self::with_window(store, owner, DEFAULT_WINDOW)
    }

    pub fn with_window(
        store: Arc<dyn NotificationStore>,
        owner: impl Into<String>,
        window: usize,
    ) -> Self {
        let owner = owner.into();
        let (unread_tx, unread_rx) = watch::channel(0usize);
        let gate = PreferenceGate::new(store.clone());

        let inner = Arc::new(CacheInner {
            owner: owner.clone(),
            window,
            store: store.clone(),
            gate,
            state: Mutex::new(CacheState {
                notifications: Vec::new(),
                unread_total: 0,
                preferences: NotificationPreferences::default_for(&owner),
                loading: true,
                errors: CacheErrors::default(),
            }),
            unread_tx,
            unread_rx,
            debounce: Mutex::new(None),
            subscription: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        // 单一共享订阅：回调持弱引用，订阅不延长缓存生命周期
        let weak: Weak<CacheInner> = Arc::downgrade(&inner);
        let client = FeedClient::new(store);
        let subscription = client.subscribe(&owner, move |record| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_insert(record);
            }
        });
        *inner.subscription.lock().unwrap() = Some(subscription);

        Self { inner }
    }

    /// 初始加载：通知列表、未读计数、偏好设置并发取
    ///
    /// 任何一项失败只填自己的 error slot，不阻塞其他项。
    pub async fn load(&self) {
        {
            self.inner.state.lock().unwrap().loading = true;
        }

        let inner = &self.inner;
        let (list, count, prefs) = tokio::join!(
            inner.store.list_recent(&inner.owner, inner.window),
            inner.store.unread_count(&inner.owner),
            inner.store.load_preferences(&inner.owner),
        );

        let mut published_count = None;
        {
            let mut state = inner.state.lock().unwrap();
            state.loading = false;

            match list {
                Ok(notifications) => {
                    state.notifications = notifications;
                    state.errors.notifications = None;
                }
                Err(e) => {
                    // 保留上一次的有效数据，只记录错误
                    warn!(owner = %inner.owner, error = %e, "notification fetch failed");
                    state.errors.notifications = Some(e.to_string());
                }
            }

            match count {
                Ok(n) => {
                    // 存储计数是权威值，覆盖本地增量
                    state.unread_total = n;
                    published_count = Some(n);
                    state.errors.unread_count = None;
                }
                Err(e) => {
                    warn!(owner = %inner.owner, error = %e, "unread count fetch failed");
                    state.errors.unread_count = Some(e.to_string());
                }
            }

            match prefs {
                Ok(Some(p)) => {
                    state.preferences = p;
                    state.errors.preferences = None;
                }
                Ok(None) => {
                    state.preferences = NotificationPreferences::default_for(&inner.owner);
                    state.errors.preferences = None;
                }
                Err(e) => {
                    // 回退到完整默认值
                    warn!(owner = %inner.owner, error = %e, "preference fetch failed, using defaults");
                    state.preferences = NotificationPreferences::default_for(&inner.owner);
                    state.errors.preferences = Some(e.to_string());
                }
            }
        }

        if let Some(n) = published_count {
            let _ = inner.unread_tx.send(n);
        } else {
            inner.publish_unread_now();
        }
    }

    /// 重新加载（刷新失败时表面继续显示 last-known-good）
    pub async fn refresh(&self) {
        self.load().await;
    }

    /// 乐观标记已读：本地立即翻转，持久化异步进行
    ///
    /// 持久化失败只写入 error slot，不回滚乐观状态，
    /// 下一次 `refresh` 从存储对账。幂等。
    pub fn mark_as_read(&self, id: &str) {
        let changed = {
            let mut guard = self.inner.state.lock().unwrap();
            let state = &mut *guard;
            match state.notifications.iter_mut().find(|n| n.id == id) {
                Some(n) if !n.is_read => {
                    n.is_read = true;
                    state.unread_total = state.unread_total.saturating_sub(1);
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.inner.schedule_unread_publish();
        }

        let inner = self.inner.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = inner.store.mark_read(&id).await {
                warn!(notification_id = %id, error = %e, "mark_read persistence failed, optimistic state kept");
                inner.state.lock().unwrap().errors.notifications = Some(e.to_string());
            }
        });
    }

    /// 全部标记已读（同 `mark_as_read` 的乐观语义）
    pub fn mark_all_as_read(&self) {
        let changed = {
            let mut state = self.inner.state.lock().unwrap();
            // 窗口外也可能有未读，总数直接归零
            let had_unread = state.unread_total > 0;
            for n in state.notifications.iter_mut().filter(|n| !n.is_read) {
                n.is_read = true;
            }
            state.unread_total = 0;
            had_unread
        };
        if changed {
            self.inner.schedule_unread_publish();
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.store.mark_all_read(&inner.owner).await {
                warn!(owner = %inner.owner, error = %e, "mark_all_read persistence failed, optimistic state kept");
                inner.state.lock().unwrap().errors.notifications = Some(e.to_string());
            }
        });
    }

    /// 更新偏好（部分更新；持久化失败时本地合并值依然生效）
    pub async fn update_preferences(&self, update: &PreferencesUpdate) -> NotificationPreferences {
        let merged = self.inner.gate.update(&self.inner.owner, update).await;
        self.inner.state.lock().unwrap().preferences = merged.clone();
        merged
    }

    /// 当前快照（表面渲染输入）
    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.inner.state.lock().unwrap();
        let mut errors = state.errors.clone();
        let sub_active = self
            .inner
            .subscription
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.is_active())
            .unwrap_or(false);
        if !sub_active && !self.inner.closed.load(Ordering::SeqCst) {
            errors.subscription = Some("live updates disconnected".to_string());
        }
        CacheSnapshot {
            notifications: state.notifications.clone(),
            unread_count: *self.inner.unread_rx.borrow(),
            preferences: state.preferences.clone(),
            loading: state.loading,
            errors,
        }
    }

    /// 未读角标订阅（防抖后的值）
    pub fn watch_unread(&self) -> watch::Receiver<usize> {
        self.inner.unread_rx.clone()
    }

    /// 确定性拆除：取消订阅并取消待触发的防抖任务
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Some(sub) = self.inner.subscription.lock().unwrap().take() {
            sub.unsubscribe();
        }
        if let Some(handle) = self.inner.debounce.lock().unwrap().take() {
            handle.abort();
        }
        debug!(owner = %self.inner.owner, "notification cache closed");
    }
}
