//! 渠道实现

pub mod email;

pub use email::{EmailChannel, EmailRelay, EmailTemplate, HttpEmailRelay, OutboundEmail, OwnerProfile, ProfileResolver};
