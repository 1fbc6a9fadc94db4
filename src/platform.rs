use std::future::Future;

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::Error;
use crate::types::{OpenId, SessionId, UnionId};

/// Temporary QR code ticket minted by the platform.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct QrTicket {
    pub ticket: String,
    #[serde(default)]
    pub expire_seconds: Option<u64>,
    /// Content URL encoded in the QR image.
    #[serde(default)]
    pub url: Option<String>,
}

impl QrTicket {
    #[must_use]
    pub fn new(ticket: impl Into<String>) -> Self {
        Self {
            ticket: ticket.into(),
            expire_seconds: None,
            url: None,
        }
    }

    #[must_use]
    pub fn with_expire_seconds(mut self, seconds: u64) -> Self {
        self.expire_seconds = Some(seconds);
        self
    }
}

/// Web-authorization access token returned by a code exchange.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct OAuthToken {
    pub access_token: String,
    pub openid: OpenId,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "non_empty_unionid")]
    pub unionid: Option<UnionId>,
}

impl OAuthToken {
    #[must_use]
    pub fn new(access_token: impl Into<String>, openid: OpenId) -> Self {
        Self {
            access_token: access_token.into(),
            openid,
            expires_in: None,
            refresh_token: None,
            scope: None,
            unionid: None,
        }
    }
}

/// Resolved WeChat user identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct Profile {
    pub openid: OpenId,
    #[serde(default, deserialize_with = "non_empty_unionid")]
    pub unionid: Option<UnionId>,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl Profile {
    #[must_use]
    pub fn new(openid: OpenId) -> Self {
        Self {
            openid,
            unionid: None,
            nickname: None,
        }
    }

    #[must_use]
    pub fn with_unionid(mut self, unionid: UnionId) -> Self {
        self.unionid = Some(unionid);
        self
    }

    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }
}

/// WeChat sends `"unionid": ""` when the account has no Open Platform binding.
fn non_empty_unionid<'de, D: Deserializer<'de>>(d: D) -> Result<Option<UnionId>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.filter(|s| !s.is_empty()).map(UnionId))
}

/// Messaging-platform effects the login flow depends on.
///
/// Implemented by [`WechatClient`](crate::wechat::WechatClient); tests
/// substitute an in-process fake.
pub trait Platform: Send + Sync + 'static {
    /// Mints a temporary QR code whose scan event echoes `scene` back.
    fn create_qr_ticket(
        &self,
        scene: &str,
        expire_seconds: u32,
    ) -> impl Future<Output = Result<QrTicket, Error>> + Send;

    /// URL of the platform-hosted QR image for `ticket`.
    fn qr_image_url(&self, ticket: &QrTicket) -> String;

    /// Looks up a follower of the official account.
    fn subscriber_info(
        &self,
        openid: &OpenId,
    ) -> impl Future<Output = Result<Profile, Error>> + Send;

    /// Consent URL that redirects back to `redirect_uri` with `state` untouched.
    fn authorize_url(&self, redirect_uri: &Url, state: &SessionId) -> Url;

    /// Exchanges a web-authorization `code` for an access token.
    fn exchange_code(&self, code: &str) -> impl Future<Output = Result<OAuthToken, Error>> + Send;

    /// Fetches the consenting user's profile.
    fn oauth_profile(
        &self,
        token: &OAuthToken,
    ) -> impl Future<Output = Result<Profile, Error>> + Send;
}
