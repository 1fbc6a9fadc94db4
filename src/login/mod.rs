//! Plug-and-play WeChat scan-to-login routes for Axum.
//!
//! A browser fetches a QR code bound to a fresh session id and polls its
//! status. When a user scans the code, WeChat pushes a scan event to the
//! callback URL; the event is decoded back to the session id and the
//! scanner's identity is recorded for the next poll. An optional consent
//! redirect resolves the user's UnionID through web authorization.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scan_login::login::{LoginConfig, login_routes};
//! use scan_login::store::MemoryStore;
//! use scan_login::wechat::{WechatClient, WechatConfig};
//!
//! // 1. Configure from environment
//! let wechat = WechatConfig::from_env()?;
//! let config = LoginConfig::from_env(&wechat)?;
//! let store = Arc::new(MemoryStore::new(config.session_ttl()));
//!
//! // 2. Mount login routes
//! let app = axum::Router::new()
//!     .merge(login_routes(config, WechatClient::new(wechat)?, store));
//! ```

mod config;
mod error;
mod links;
mod orchestrator;
mod pages;
mod publisher;
mod routes;
mod state;

pub use config::{Features, LoginConfig, QrMode};
pub use error::LoginError;
pub use links::Links;
pub use orchestrator::{IssuedCode, Orchestrator};
pub use publisher::StatusResponse;
pub use routes::login_routes;
