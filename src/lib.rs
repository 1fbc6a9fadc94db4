#![doc = include_str!("../README.md")]

pub mod error;
pub mod login;
pub mod platform;
pub mod scene;
pub mod sid;
pub mod store;
pub mod types;
pub mod wechat;

// Re-exports for convenient access
pub use error::Error;
pub use login::{Features, LoginConfig, LoginError, QrMode, StatusResponse, login_routes};
pub use platform::{OAuthToken, Platform, Profile, QrTicket};
pub use scene::ScanKey;
pub use sid::new_session_id;
pub use store::{MemoryStore, SessionStore, spawn_sweeper};
pub use types::{LoginOutcome, OpenId, SessionId, UnionId};
pub use wechat::{WebhookVerifier, WechatClient, WechatConfig};
