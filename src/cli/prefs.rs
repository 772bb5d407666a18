//! prefs 命令 - 查看与更新通知偏好

use anyhow::Result;
use clap::{Args, Subcommand};
use std::sync::Arc;

use crate::preferences::{PreferenceGate, PreferencesUpdate};
use crate::store::NotificationStore;

/// prefs 命令参数
#[derive(Args)]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub command: PrefsCommand,
}

#[derive(Subcommand)]
pub enum PrefsCommand {
    /// 显示偏好（未存储时显示默认值）
    Show {
        /// owner id
        #[arg(long)]
        owner: String,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 部分更新偏好
    Set {
        /// owner id
        #[arg(long)]
        owner: String,
        #[arg(long)]
        email_enabled: Option<bool>,
        #[arg(long)]
        sms_enabled: Option<bool>,
        #[arg(long)]
        push_enabled: Option<bool>,
        #[arg(long)]
        in_app_enabled: Option<bool>,
        #[arg(long)]
        appointment_reminders: Option<bool>,
        #[arg(long)]
        prescription_updates: Option<bool>,
        #[arg(long)]
        treatment_plan_updates: Option<bool>,
        #[arg(long)]
        emergency_alerts: Option<bool>,
        #[arg(long)]
        system_notifications: Option<bool>,
        /// 免打扰开始 "HH:MM"
        #[arg(long)]
        quiet_hours_start: Option<String>,
        /// 免打扰结束 "HH:MM"
        #[arg(long)]
        quiet_hours_end: Option<String>,
    },
}

/// 处理 prefs 命令
pub async fn handle_prefs(store: Arc<dyn NotificationStore>, args: PrefsArgs) -> Result<()> {
    let gate = PreferenceGate::new(store);
    match args.command {
        PrefsCommand::Show { owner, json } => {
            let prefs = gate.load(&owner).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            } else {
                println!("preferences for {}:", prefs.owner);
                println!("  email: {}  sms: {}  push: {}  in-app: {}",
                    prefs.email_enabled, prefs.sms_enabled, prefs.push_enabled, prefs.in_app_enabled);
                println!("  appointments: {}  prescriptions: {}  treatment plans: {}",
                    prefs.appointment_reminders, prefs.prescription_updates, prefs.treatment_plan_updates);
                println!("  emergencies: {}  system: {}",
                    prefs.emergency_alerts, prefs.system_notifications);
                println!("  quiet hours: {} - {}", prefs.quiet_hours_start, prefs.quiet_hours_end);
            }
        }
        PrefsCommand::Set {
            owner,
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
        } => {
            let update = PreferencesUpdate {
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
            };
            let merged = gate.update(&owner, &update).await;
            println!("{}", serde_json::to_string_pretty(&merged)?);
        }
    }
    Ok(())
}
