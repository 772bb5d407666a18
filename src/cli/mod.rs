//! CLI 命令模块

pub mod prefs;
pub mod send;
pub mod watch;

pub use prefs::PrefsArgs;
pub use send::SendArgs;
pub use watch::WatchArgs;
