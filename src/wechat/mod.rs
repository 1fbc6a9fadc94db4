//! WeChat Official Account adapter.
//!
//! [`WechatClient`] implements [`Platform`](crate::platform::Platform) over
//! the HTTP API; [`WebhookVerifier`] authenticates and decodes push messages
//! delivered to the callback URL.

mod client;
mod config;
pub mod message;
pub mod webhook;

pub use client::WechatClient;
pub use config::WechatConfig;
pub use message::{EventKind, InboundMessage, MessageKind, Reply};
pub use webhook::{Opened, WebhookParams, WebhookVerifier, signature};
