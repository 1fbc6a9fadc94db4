/// Errors raised by the WeChat collaborator and the webhook codec.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The WeChat API answered with a non-zero `errcode`.
    #[error("WeChat API error during {operation}: {errcode} {errmsg}")]
    Api {
        operation: &'static str,
        errcode: i64,
        errmsg: String,
    },
    /// The WeChat API answered with a non-2xx HTTP status.
    #[error("WeChat API returned HTTP {status} during {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// Webhook signature did not match the configured token.
    #[error("Signature mismatch")]
    Signature,
    #[error("Malformed message: {0}")]
    Message(String),
    #[error("Payload crypto error: {0}")]
    Crypto(String),
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[cfg(feature = "qr-image")]
    #[error("QR rendering failed: {0}")]
    Render(#[from] qrcode::types::QrError),
}

impl Error {
    /// Access-token errcodes after which the cached token must be dropped.
    pub(crate) fn is_stale_token(&self) -> bool {
        matches!(
            self,
            Self::Api {
                errcode: 40001 | 40014 | 42001,
                ..
            }
        )
    }
}
