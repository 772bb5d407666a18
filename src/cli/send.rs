//! send 命令 - 创建一条通知并按偏好扇出
//!
//! 给了 `--relay-url` 才注册 email 渠道；CLI 环境没有档案库，
//! 收件地址通过 `--email` 写入 metadata 覆盖位。

use anyhow::{anyhow, Result};
use clap::Args;
use std::sync::Arc;

use crate::channel::SendResult;
use crate::channels::{EmailChannel, HttpEmailRelay, OwnerProfile, ProfileResolver};
use crate::dispatcher::Dispatcher;
use crate::error::NotifyError;
use crate::model::{NotificationDraft, NotificationKind, Priority};
use crate::store::NotificationStore;

/// send 命令参数
#[derive(Args)]
pub struct SendArgs {
    /// 收件人 owner id
    #[arg(long)]
    pub owner: String,
    /// 标题
    #[arg(long)]
    pub title: String,
    /// 正文
    #[arg(long)]
    pub message: String,
    /// 类型（appointment/prescription/treatment_plan/.../info）
    #[arg(long, default_value = "info")]
    pub kind: String,
    /// 优先级（urgent/high/normal/medium/low，两套历史拼写都接受）
    #[arg(long, default_value = "normal")]
    pub priority: String,
    /// 深链 URL
    #[arg(long)]
    pub action_url: Option<String>,
    /// 过期时间（从现在起的小时数）
    #[arg(long)]
    pub expires_in_hours: Option<i64>,
    /// 收件邮箱（写入 metadata.email 覆盖位）
    #[arg(long)]
    pub email: Option<String>,
    /// 邮件中继服务地址；缺省不注册 email 渠道
    #[arg(long)]
    pub relay_url: Option<String>,
    /// 只持久化，不尝试外发渠道
    #[arg(long)]
    pub no_email: bool,
}

/// CLI 环境没有档案库，永远返回 None（只能走 metadata 覆盖）
struct NoProfiles;

#[async_trait::async_trait]
impl ProfileResolver for NoProfiles {
    async fn resolve(&self, _owner: &str) -> Result<Option<OwnerProfile>, NotifyError> {
        Ok(None)
    }
}

/// 处理 send 命令
pub async fn handle_send(store: Arc<dyn NotificationStore>, args: SendArgs) -> Result<()> {
    let kind = NotificationKind::parse(&args.kind)
        .ok_or_else(|| anyhow!("unknown kind: {}", args.kind))?;
    let priority = Priority::parse(&args.priority)
        .ok_or_else(|| anyhow!("unknown priority: {}", args.priority))?;

    let mut draft = NotificationDraft::new(&args.owner, kind, priority, &args.title, &args.message);
    if let Some(url) = &args.action_url {
        draft = draft.with_action_url(url);
    }
    if let Some(hours) = args.expires_in_hours {
        draft = draft.with_expiry(chrono::Utc::now() + chrono::Duration::hours(hours));
    }
    if let Some(email) = &args.email {
        draft = draft.with_metadata_entry("email", serde_json::json!(email));
    }

    let mut dispatcher = Dispatcher::new(store);
    if let Some(relay_url) = &args.relay_url {
        dispatcher.register_channel(Arc::new(EmailChannel::new(
            Arc::new(NoProfiles),
            Arc::new(HttpEmailRelay::new(relay_url)),
        )));
    }

    let outcome = dispatcher.create_notification(draft, !args.no_email).await?;
    println!("created notification {}", outcome.id);
    for (channel, result) in &outcome.channels {
        match result {
            SendResult::Sent => println!("  {} -> sent", channel),
            SendResult::Skipped(reason) => println!("  {} -> skipped ({})", channel, reason),
            SendResult::Failed(reason) => println!("  {} -> FAILED ({})", channel, reason),
        }
    }
    Ok(())
}
