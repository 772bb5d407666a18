//! watch 命令 - 订阅变更流，实时打印某个 owner 的新通知

use anyhow::Result;
use clap::Args;
use std::sync::Arc;

use crate::feed::FeedClient;
use crate::store::NotificationStore;

/// watch 命令参数
#[derive(Args)]
pub struct WatchArgs {
    /// owner id
    #[arg(long)]
    pub owner: String,
}

/// 处理 watch 命令（Ctrl+C 退出）
pub async fn handle_watch(store: Arc<dyn NotificationStore>, args: WatchArgs) -> Result<()> {
    println!("watching notifications for {} (Ctrl+C to stop)", args.owner);

    let client = FeedClient::new(store);
    let subscription = client.subscribe(&args.owner, |record| {
        println!(
            "[{}] {} {} - {}: {}",
            record.created_at.format("%H:%M:%S"),
            record.priority,
            record.kind,
            record.title,
            record.message
        );
    });

    tokio::signal::ctrl_c().await?;
    subscription.unsubscribe();
    Ok(())
}
