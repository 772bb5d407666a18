//! 实时变更流客户端 - 订阅插入事件并按 owner 过滤
//!
//! 对存储广播流做 owner 过滤与规范化，把插入事件推给回调。
//! `unsubscribe` 幂等：UI 表面卸载时订阅可能还在建立中，
//! 重复调用或对已拆除的句柄调用都必须安全。
//! 断流后不做重连（接受的非目标）：停止投递直到消费方重新订阅。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::Notification;
use crate::store::{NotificationStore, StoreEvent};

/// 变更流客户端
pub struct FeedClient {
    store: Arc<dyn NotificationStore>,
}

impl FeedClient {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// 订阅指定 owner 的插入事件
    ///
    /// 每个事件规范化为 `Notification` 后调用 `on_insert`。
    pub fn subscribe<F>(&self, owner: &str, on_insert: F) -> FeedSubscription
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        let owner = owner.to_string();
        let mut feed = self.store.change_feed();
        let active = Arc::new(AtomicBool::new(true));
        let task_active = active.clone();

        let handle = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(StoreEvent::Inserted(record)) => {
                        if record.owner == owner {
                            on_insert(record);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // 落后就丢事件，refresh 是恢复路径
                        warn!(owner = %owner, missed, "feed receiver lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!(owner = %owner, "feed closed, live updates stopped");
                        task_active.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        FeedSubscription {
            handle: Mutex::new(Some(handle)),
            active,
        }
    }
}

/// 订阅句柄
pub struct FeedSubscription {
    handle: Mutex<Option<JoinHandle<()>>>,
    active: Arc<AtomicBool>,
}

impl FeedSubscription {
    /// 取消订阅（幂等，可重复调用）
    pub fn unsubscribe(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
        self.active.store(false, Ordering::SeqCst);
    }

    /// 是否仍在接收实时事件
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
