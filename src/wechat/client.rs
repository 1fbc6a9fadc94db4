use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use super::config::WechatConfig;
use crate::error::Error;
use crate::platform::{OAuthToken, Platform, Profile, QrTicket};
use crate::types::{OpenId, SessionId};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh the access token this long before WeChat expires it.
const TOKEN_REFRESH_MARGIN: u64 = 300;

/// WeChat Official Account API client.
///
/// Holds the client-credential access token in process and refreshes it
/// shortly before expiry, or immediately after the API reports it invalid.
/// Failed calls are never retried here.
pub struct WechatClient {
    config: WechatConfig,
    http: reqwest::Client,
    access_token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: u64,
}

impl WechatClient {
    /// Create a client with a bounded request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be initialised.
    pub fn new(config: WechatConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            config,
            http,
            access_token: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn config(&self) -> &WechatConfig {
        &self.config
    }

    fn api(&self, path: &str) -> Url {
        WechatConfig::endpoint(&self.config.api_base, path)
    }

    /// Returns the cached access token, fetching a new one when due.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Api`] if
    /// WeChat rejects the app credentials.
    pub async fn access_token(&self) -> Result<String, Error> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.value.clone());
        }

        let response = self
            .http
            .get(self.api("/cgi-bin/token"))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
            ])
            .send()
            .await?;
        let fresh: AccessTokenResponse = Self::parse(response, "access token").await?;

        let lifetime = fresh.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN).max(60);
        tracing::debug!(expires_in = fresh.expires_in, "Fetched WeChat access token");
        *cached = Some(CachedToken {
            value: fresh.access_token.clone(),
            refresh_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(fresh.access_token)
    }

    async fn forget_stale_token<T>(&self, result: &Result<T, Error>) {
        if let Err(e) = result {
            if e.is_stale_token() {
                tracing::warn!(error = %e, "Dropping rejected WeChat access token");
                *self.access_token.lock().await = None;
            }
        }
    }

    async fn request_qr_ticket(&self, scene: &str, expire_seconds: u32) -> Result<QrTicket, Error> {
        let token = self.access_token().await?;
        let body = json!({
            "expire_seconds": expire_seconds,
            "action_name": "QR_STR_SCENE",
            "action_info": { "scene": { "scene_str": scene } },
        });
        let response = self
            .http
            .post(self.api("/cgi-bin/qrcode/create"))
            .query(&[("access_token", token.as_str())])
            .json(&body)
            .send()
            .await?;
        Self::parse(response, "qrcode create").await
    }

    async fn request_subscriber_info(&self, openid: &OpenId) -> Result<Profile, Error> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.api("/cgi-bin/user/info"))
            .query(&[
                ("access_token", token.as_str()),
                ("openid", openid.0.as_str()),
                ("lang", self.config.lang.as_str()),
            ])
            .send()
            .await?;
        Self::parse(response, "user info").await
    }

    /// Reads a WeChat JSON response, mapping a non-2xx status to [`Error::Status`]
    /// and a non-zero `errcode` to [`Error::Api`].
    async fn parse<T: DeserializeOwned>(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<T, Error> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        let value: JsonValue = serde_json::from_str(&body)?;
        if let Some(errcode) = value
            .get("errcode")
            .and_then(JsonValue::as_i64)
            .filter(|code| *code != 0)
        {
            let errmsg = value
                .get("errmsg")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(Error::Api {
                operation,
                errcode,
                errmsg,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

impl Platform for WechatClient {
    async fn create_qr_ticket(&self, scene: &str, expire_seconds: u32) -> Result<QrTicket, Error> {
        let result = self.request_qr_ticket(scene, expire_seconds).await;
        self.forget_stale_token(&result).await;
        result
    }

    fn qr_image_url(&self, ticket: &QrTicket) -> String {
        let mut url = WechatConfig::endpoint(&self.config.mp_base, "/cgi-bin/showqrcode");
        url.query_pairs_mut().append_pair("ticket", &ticket.ticket);
        url.into()
    }

    async fn subscriber_info(&self, openid: &OpenId) -> Result<Profile, Error> {
        let result = self.request_subscriber_info(openid).await;
        self.forget_stale_token(&result).await;
        result
    }

    fn authorize_url(&self, redirect_uri: &Url, state: &SessionId) -> Url {
        let mut url = WechatConfig::endpoint(&self.config.oauth_base, "/connect/oauth2/authorize");
        // WeChat checks parameter order.
        url.query_pairs_mut()
            .append_pair("appid", &self.config.app_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", "snsapi_userinfo")
            .append_pair("state", state.as_str());
        url.set_fragment(Some("wechat_redirect"));
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthToken, Error> {
        let response = self
            .http
            .get(self.api("/sns/oauth2/access_token"))
            .query(&[
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        Self::parse(response, "token exchange").await
    }

    async fn oauth_profile(&self, token: &OAuthToken) -> Result<Profile, Error> {
        let response = self
            .http
            .get(self.api("/sns/userinfo"))
            .query(&[
                ("access_token", token.access_token.as_str()),
                ("openid", token.openid.0.as_str()),
                ("lang", self.config.lang.as_str()),
            ])
            .send()
            .await?;
        Self::parse(response, "userinfo request").await
    }
}
