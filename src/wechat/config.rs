use url::Url;

use crate::error::Error;

/// WeChat Official Account credentials and endpoints.
///
/// Required fields are constructor parameters; endpoint overrides exist so
/// tests can point the client at a local mock server.
///
/// ```rust,ignore
/// use scan_login::wechat::WechatConfig;
///
/// let config = WechatConfig::new("wx0123", "app-secret", "webhook-token")
///     .with_encoding_aes_key("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct WechatConfig {
    pub(crate) app_id: String,
    pub(crate) app_secret: String,
    pub(crate) token: String,
    pub(crate) encoding_aes_key: Option<String>,
    pub(crate) api_base: Url,
    pub(crate) oauth_base: Url,
    pub(crate) mp_base: Url,
    pub(crate) lang: String,
}

impl WechatConfig {
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            token: token.into(),
            encoding_aes_key: None,
            api_base: "https://api.weixin.qq.com"
                .parse()
                .expect("valid default URL"),
            oauth_base: "https://open.weixin.qq.com"
                .parse()
                .expect("valid default URL"),
            mp_base: "https://mp.weixin.qq.com"
                .parse()
                .expect("valid default URL"),
            lang: "zh_CN".into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `WECHAT_APPID`: Official Account AppID
    /// - `WECHAT_APPSECRET`: Official Account AppSecret
    /// - `WECHAT_TOKEN`: Webhook verification token
    ///
    /// # Optional env vars
    /// - `WECHAT_AESKEY`: EncodingAESKey, enables encrypted webhook payloads
    /// - `WECHAT_API_BASE`, `WECHAT_OAUTH_BASE`, `WECHAT_MP_BASE`: endpoint overrides
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required var is missing or a URL is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{name} is required")))
        };
        let mut config = Self::new(
            required("WECHAT_APPID")?,
            required("WECHAT_APPSECRET")?,
            required("WECHAT_TOKEN")?,
        );

        if let Some(key) = std::env::var("WECHAT_AESKEY").ok().filter(|k| !k.is_empty()) {
            config = config.with_encoding_aes_key(key);
        }
        if let Some(url) = env_url("WECHAT_API_BASE")? {
            config = config.with_api_base(url);
        }
        if let Some(url) = env_url("WECHAT_OAUTH_BASE")? {
            config = config.with_oauth_base(url);
        }
        if let Some(url) = env_url("WECHAT_MP_BASE")? {
            config = config.with_mp_base(url);
        }
        Ok(config)
    }

    /// Enable encrypted webhook payloads (43-character EncodingAESKey).
    #[must_use]
    pub fn with_encoding_aes_key(mut self, key: impl Into<String>) -> Self {
        self.encoding_aes_key = Some(key.into());
        self
    }

    /// Override the `api.weixin.qq.com` endpoint.
    #[must_use]
    pub fn with_api_base(mut self, url: Url) -> Self {
        self.api_base = url;
        self
    }

    /// Override the `open.weixin.qq.com` authorization endpoint.
    #[must_use]
    pub fn with_oauth_base(mut self, url: Url) -> Self {
        self.oauth_base = url;
        self
    }

    /// Override the `mp.weixin.qq.com` QR image endpoint.
    #[must_use]
    pub fn with_mp_base(mut self, url: Url) -> Self {
        self.mp_base = url;
        self
    }

    /// Profile language (default: `zh_CN`).
    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn encoding_aes_key(&self) -> Option<&str> {
        self.encoding_aes_key.as_deref()
    }

    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    #[must_use]
    pub fn oauth_base(&self) -> &Url {
        &self.oauth_base
    }

    #[must_use]
    pub fn mp_base(&self) -> &Url {
        &self.mp_base
    }

    /// Join `path` onto `base`, tolerating a base with or without a path.
    pub(crate) fn endpoint(base: &Url, path: &str) -> Url {
        let mut url = base.clone();
        let joined = format!("{}{}", base.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }
}

fn env_url(name: &str) -> Result<Option<Url>, Error> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}: {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_constructor() {
        let config = WechatConfig::new("wx123", "secret", "token");

        assert_eq!(config.app_id(), "wx123");
        assert_eq!(config.token(), "token");
        assert_eq!(config.encoding_aes_key(), None);
        assert_eq!(config.api_base().as_str(), "https://api.weixin.qq.com/");
    }

    #[test]
    fn test_config_with_overrides() {
        let config = WechatConfig::new("wx123", "secret", "token")
            .with_api_base("http://127.0.0.1:9000/".parse().unwrap())
            .with_encoding_aes_key("key");

        assert_eq!(config.api_base().as_str(), "http://127.0.0.1:9000/");
        assert_eq!(config.encoding_aes_key(), Some("key"));
    }

    #[test]
    fn test_profile_language() {
        let config = WechatConfig::new("wx123", "secret", "token");
        assert_eq!(config.lang, "zh_CN");

        let config = config.with_lang("en");
        assert_eq!(config.lang, "en");
    }

    #[test]
    fn test_endpoint_join() {
        let root: Url = "https://api.weixin.qq.com".parse().unwrap();
        assert_eq!(
            WechatConfig::endpoint(&root, "/cgi-bin/token").as_str(),
            "https://api.weixin.qq.com/cgi-bin/token"
        );

        let nested: Url = "http://127.0.0.1:9000/proxy/".parse().unwrap();
        assert_eq!(
            WechatConfig::endpoint(&nested, "/cgi-bin/token").as_str(),
            "http://127.0.0.1:9000/proxy/cgi-bin/token"
        );
    }
}
