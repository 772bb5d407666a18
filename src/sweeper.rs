//! 过期清扫 - 删除已过 expires_at 的记录
//!
//! 幂等，可重复运行；没有 expires_at 的记录永远不会被碰。
//! `spawn` 启动后台定时任务，返回的句柄 abort 即停止。

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::NotifyError;
use crate::store::NotificationStore;

/// 执行一次清扫，返回删除条数
pub async fn sweep(store: &dyn NotificationStore) -> Result<usize, NotifyError> {
    let removed = store.sweep_expired(Utc::now()).await?;
    if removed > 0 {
        info!(removed, "swept expired notifications");
    }
    Ok(removed)
}

/// 启动后台清扫任务，每 `interval` 执行一次
///
/// 单次失败只记录错误，任务继续。
pub fn spawn(store: Arc<dyn NotificationStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // 第一次 tick 立即返回，跳过以免启动即清扫
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = sweep(store.as_ref()).await {
                error!(error = %e, "expiration sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationDraft, NotificationKind, Priority};
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = MemoryStore::new();
        let now = Utc::now();

        // 一条昨天过期，一条无过期时间
        let mut expired = NotificationDraft::new(
            "u1",
            NotificationKind::Info,
            Priority::Low,
            "old",
            "m",
        )
        .build(now)
        .unwrap();
        expired.expires_at = Some(now - ChronoDuration::days(1));

        let keeper =
            NotificationDraft::new("u1", NotificationKind::Info, Priority::Low, "keep", "m")
                .build(now)
                .unwrap();

        store.insert(&expired).await.unwrap();
        store.insert(&keeper).await.unwrap();

        assert_eq!(sweep(&store).await.unwrap(), 1);
        assert!(store.get(&keeper.id).await.unwrap().is_some());
        assert!(store.get(&expired.id).await.unwrap().is_none());

        // 幂等
        assert_eq!(sweep(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs_periodically() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut expired = NotificationDraft::new(
            "u1",
            NotificationKind::Info,
            Priority::Low,
            "old",
            "m",
        )
        .build(now)
        .unwrap();
        expired.expires_at = Some(now - ChronoDuration::hours(1));
        store.insert(&expired).await.unwrap();

        let handle = spawn(store.clone(), Duration::from_millis(20));

        let mut swept = false;
        for _ in 0..100 {
            if store.get(&expired.id).await.unwrap().is_none() {
                swept = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(swept);
    }
}
