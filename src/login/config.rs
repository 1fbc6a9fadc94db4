use std::time::Duration;

use url::Url;

use super::error::LoginError;
use crate::store::MemoryStore;
use crate::wechat::{WebhookVerifier, WechatConfig};

/// What the login QR code encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrMode {
    /// Platform-minted parametric code; scanning it sends a scan event.
    #[default]
    PlatformTicket,
    /// Locally rendered code linking to the consent page.
    ConsentLink,
}

impl std::str::FromStr for QrMode {
    type Err = LoginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ticket" | "platform" => Ok(Self::PlatformTicket),
            "consent" | "link" => Ok(Self::ConsentLink),
            other => Err(LoginError::Config(format!(
                "LOGIN_QR_MODE: unknown mode {other:?} (expected \"ticket\" or \"consent\")"
            ))),
        }
    }
}

/// Optional login behaviours, all handled by the same orchestrator.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Features {
    /// Serve the consent page and the web-authorization redirect flow.
    pub consent: bool,
    /// Look up the unionid of a scanning follower (best effort).
    pub enrich_on_scan: bool,
    pub qr_mode: QrMode,
    /// Reply sent to users who follow the account by scanning.
    pub welcome: Option<String>,
    /// Echo text messages back to the sender.
    pub echo_text: bool,
    /// Lifetime of platform QR tickets (60 s to 30 days).
    pub qr_expire_seconds: u32,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            consent: true,
            enrich_on_scan: true,
            qr_mode: QrMode::PlatformTicket,
            welcome: Some("Thanks for following!".into()),
            echo_text: true,
            qr_expire_seconds: 600,
        }
    }
}

impl Features {
    const QR_EXPIRE_RANGE: std::ops::RangeInclusive<u32> = 60..=2_592_000;

    #[must_use]
    pub fn with_consent(mut self, enabled: bool) -> Self {
        self.consent = enabled;
        self
    }

    #[must_use]
    pub fn with_enrich_on_scan(mut self, enabled: bool) -> Self {
        self.enrich_on_scan = enabled;
        self
    }

    #[must_use]
    pub fn with_qr_mode(mut self, mode: QrMode) -> Self {
        self.qr_mode = mode;
        self
    }

    #[must_use]
    pub fn with_welcome(mut self, welcome: Option<String>) -> Self {
        self.welcome = welcome;
        self
    }

    #[must_use]
    pub fn with_echo_text(mut self, enabled: bool) -> Self {
        self.echo_text = enabled;
        self
    }

    #[must_use]
    pub fn with_qr_expire_seconds(mut self, seconds: u32) -> Self {
        self.qr_expire_seconds = seconds;
        self
    }

    /// # Errors
    ///
    /// Returns [`LoginError::Config`] for contradictory or out-of-range settings.
    pub fn validate(&self) -> Result<(), LoginError> {
        if self.qr_mode == QrMode::ConsentLink && !self.consent {
            return Err(LoginError::Config(
                "consent QR mode requires the consent flow to be enabled".into(),
            ));
        }
        if !Self::QR_EXPIRE_RANGE.contains(&self.qr_expire_seconds) {
            return Err(LoginError::Config(format!(
                "QR expiry must be within {}..={} seconds",
                Self::QR_EXPIRE_RANGE.start(),
                Self::QR_EXPIRE_RANGE.end()
            )));
        }
        Ok(())
    }
}

/// Route-level settings.
#[derive(Debug, Clone)]
pub(crate) struct LoginSettings {
    pub(crate) base_path: String,
    pub(crate) public_url: Option<Url>,
    pub(crate) session_ttl: Duration,
}

impl LoginSettings {
    fn defaults() -> Self {
        Self {
            base_path: "/login".into(),
            public_url: None,
            session_ttl: MemoryStore::DEFAULT_TTL,
        }
    }
}

/// Scan-login configuration.
///
/// Required field (`webhook`) is a constructor parameter. Use
/// [`from_env()`](LoginConfig::from_env) for convention-based setup, or
/// [`new()`](LoginConfig::new) with `with_*` methods for full control.
pub struct LoginConfig {
    pub(super) webhook: WebhookVerifier,
    pub(super) features: Features,
    pub(super) settings: LoginSettings,
}

impl LoginConfig {
    #[must_use]
    pub fn new(webhook: WebhookVerifier) -> Self {
        Self {
            webhook,
            features: Features::default(),
            settings: LoginSettings::defaults(),
        }
    }

    /// Create config from the WeChat credentials and environment variables.
    ///
    /// # Optional env vars
    /// - `LOGIN_BASE_PATH`: Route prefix (default `/login`)
    /// - `LOGIN_PUBLIC_URL`: Public origin used for links and callbacks;
    ///   otherwise derived from forwarding headers
    /// - `LOGIN_CONSENT`: `"0"`/`"false"` disables the consent flow
    /// - `LOGIN_ENRICH_ON_SCAN`: `"0"`/`"false"` skips unionid lookups on scan
    /// - `LOGIN_QR_MODE`: `ticket` (default) or `consent`
    /// - `LOGIN_WELCOME`: Welcome reply text; empty disables it
    /// - `LOGIN_ECHO_TEXT`: `"0"`/`"false"` disables the text echo
    /// - `LOGIN_SESSION_TTL_SECS`: Lifetime of completed logins (default 600)
    /// - `LOGIN_QR_EXPIRE_SECS`: Lifetime of platform QR tickets (default 600)
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Config`] if a value is invalid.
    pub fn from_env(wechat: &WechatConfig) -> Result<Self, LoginError> {
        let webhook = WebhookVerifier::from_config(wechat)?;
        let defaults = Features::default();

        let mut features = defaults
            .clone()
            .with_consent(env_flag("LOGIN_CONSENT", defaults.consent))
            .with_enrich_on_scan(env_flag("LOGIN_ENRICH_ON_SCAN", defaults.enrich_on_scan))
            .with_echo_text(env_flag("LOGIN_ECHO_TEXT", defaults.echo_text));
        if let Ok(mode) = std::env::var("LOGIN_QR_MODE") {
            features = features.with_qr_mode(mode.parse()?);
        }
        if let Ok(welcome) = std::env::var("LOGIN_WELCOME") {
            features = features.with_welcome(Some(welcome).filter(|w| !w.is_empty()));
        }
        if let Some(seconds) = env_number("LOGIN_QR_EXPIRE_SECS")? {
            let seconds = u32::try_from(seconds)
                .map_err(|_| LoginError::Config("LOGIN_QR_EXPIRE_SECS is too large".into()))?;
            features = features.with_qr_expire_seconds(seconds);
        }

        let mut config = Self::new(webhook).with_features(features);

        if let Ok(path) = std::env::var("LOGIN_BASE_PATH") {
            config = config.with_base_path(path);
        }
        if let Ok(url_str) = std::env::var("LOGIN_PUBLIC_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| LoginError::Config(format!("LOGIN_PUBLIC_URL: {e}")))?;
            config = config.with_public_url(url);
        }
        if let Some(seconds) = env_number("LOGIN_SESSION_TTL_SECS")? {
            config = config.with_session_ttl(Duration::from_secs(seconds));
        }

        config.features.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Route prefix; trailing slashes are dropped and `/` mounts at the root.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_end_matches('/');
        self.settings.base_path = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    #[must_use]
    pub fn with_public_url(mut self, url: Url) -> Self {
        self.settings.public_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.settings.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn features(&self) -> &Features {
        &self.features
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.settings.base_path
    }

    /// Lifetime to give the session store.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.settings.session_ttl
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_number(name: &str) -> Result<Option<u64>, LoginError> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| LoginError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}
