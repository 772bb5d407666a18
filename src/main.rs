//! Practice Notify CLI
//!
//! 通知管线的运维入口：创建、查看、标记已读、偏好管理与过期清扫。
//! 默认使用 ~/.config/practice-notify 下的 JSONL 存储。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use practice_notify::cli::{prefs, send, watch, PrefsArgs, SendArgs, WatchArgs};
use practice_notify::store::{JsonlStore, NotificationStore};
use practice_notify::sweeper;

#[derive(Parser)]
#[command(name = "pnotify")]
#[command(about = "Practice Notify - 通知投递与呈现管线")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 创建一条通知并按偏好扇出
    Send(SendArgs),
    /// 列出某个 owner 的最近通知
    List {
        /// owner id
        #[arg(long)]
        owner: String,
        /// 显示最近 N 条
        #[arg(long, short, default_value = "20")]
        limit: usize,
        /// 只显示未读
        #[arg(long)]
        unread: bool,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 标记单条通知已读
    MarkRead {
        /// 通知 id
        id: String,
    },
    /// 标记某个 owner 的全部通知已读
    MarkAllRead {
        /// owner id
        #[arg(long)]
        owner: String,
    },
    /// 查看/更新通知偏好
    Prefs(PrefsArgs),
    /// 删除所有已过期的通知
    Sweep,
    /// 实时打印某个 owner 的新通知
    Watch(WatchArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store: Arc<dyn NotificationStore> = Arc::new(JsonlStore::new());

    match cli.command {
        Commands::Send(args) => send::handle_send(store, args).await?,
        Commands::List {
            owner,
            limit,
            unread,
            json,
        } => {
            let mut records = store.list_recent(&owner, limit).await?;
            if unread {
                records.retain(|r| !r.is_read);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("no notifications for {}", owner);
            } else {
                for r in &records {
                    let marker = if r.is_read { " " } else { "*" };
                    println!(
                        "{} [{}] {} {} - {}",
                        marker,
                        r.created_at.format("%Y-%m-%d %H:%M"),
                        r.priority,
                        r.title,
                        r.id
                    );
                }
                let unread_count = store.unread_count(&owner).await?;
                println!("{} unread", unread_count);
            }
        }
        Commands::MarkRead { id } => {
            if store.mark_read(&id).await? {
                println!("marked {} as read", id);
            } else {
                println!("{} already read or not found", id);
            }
        }
        Commands::MarkAllRead { owner } => {
            let changed = store.mark_all_read(&owner).await?;
            println!("marked {} notifications as read", changed);
        }
        Commands::Prefs(args) => prefs::handle_prefs(store, args).await?,
        Commands::Sweep => {
            let removed = sweeper::sweep(store.as_ref()).await?;
            println!("removed {} expired notifications", removed);
        }
        Commands::Watch(args) => watch::handle_watch(store, args).await?,
    }

    Ok(())
}
