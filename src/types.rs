use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;

/// Opaque login correlation key.
///
/// Ties a displayed QR code to the scan event and to the poll responses that
/// follow it. Guaranteed well-shaped by construction: 1 to [`SessionId::MAX_LEN`]
/// bytes of `[A-Za-z0-9_-]`, so it is safe in URLs, HTML and scene strings.
/// Use `"0123abcd".parse::<SessionId>()` or `SessionId::try_from(string)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Scene strings are capped at 64 bytes and the `login:` namespace takes 6.
    pub const MAX_LEN: usize = 58;

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_well_formed(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= Self::MAX_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if Self::is_well_formed(&s) {
            Ok(Self(s))
        } else {
            Err(Error::InvalidSessionId(s))
        }
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Account-scoped WeChat user identifier (the primary login identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct OpenId(pub String);

/// Cross-application WeChat user identifier.
///
/// Only present when the official account is bound to an Open Platform
/// account, and reliably only through the interactive consent flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UnionId(pub String);

/// Completed login for one session id.
///
/// A pending login has no `LoginOutcome` at all; absence is the pending state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub openid: OpenId,
    pub unionid: Option<UnionId>,
    /// Time of the latest write for this session.
    pub scanned_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_session_ids() {
        assert!("0123456789abcdef0123456789abcdef".parse::<SessionId>().is_ok());
        assert!("a".parse::<SessionId>().is_ok());
        assert!("with-dash_and_underscore".parse::<SessionId>().is_ok());
        assert!("x".repeat(SessionId::MAX_LEN).parse::<SessionId>().is_ok());
    }

    #[test]
    fn invalid_session_id_empty() {
        assert!("".parse::<SessionId>().is_err());
    }

    #[test]
    fn invalid_session_id_too_long() {
        assert!("x".repeat(SessionId::MAX_LEN + 1).parse::<SessionId>().is_err());
    }

    #[test]
    fn invalid_session_id_charset() {
        assert!("has space".parse::<SessionId>().is_err());
        assert!("quote'".parse::<SessionId>().is_err());
        assert!("<script>".parse::<SessionId>().is_err());
        assert!("login:abc".parse::<SessionId>().is_err());
    }

    #[test]
    fn session_id_serde_rejects_bad_shape() {
        let id: SessionId = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert!(serde_json::from_str::<SessionId>("\"a b\"").is_err());
    }

    #[test]
    fn openid_display_and_serde() {
        let openid = OpenId::from("OPENID123".to_string());
        assert_eq!(openid.to_string(), "OPENID123");
        assert_eq!(serde_json::to_string(&openid).unwrap(), "\"OPENID123\"");
    }
}
