//! Scene-string codec for login QR codes.
//!
//! A login QR code carries `login:<sid>` as its scene string. WeChat echoes it
//! back as the `EventKey` of the scan event: verbatim for `SCAN` (user already
//! follows the account) and prefixed with `qrscene_` for `subscribe`.

use crate::types::SessionId;

/// Prefix WeChat adds to the event key of a follow-via-QR event.
pub const SUBSCRIBE_PREFIX: &str = "qrscene_";

/// Namespace marking a scene string as a login scene.
pub const LOGIN_NAMESPACE: &str = "login:";

/// What an inbound event key refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKey {
    /// Not a login scene; the event is handled without touching any session.
    Unrelated,
    /// A login scene for this session id.
    Login(SessionId),
}

/// Builds the scene string embedded in a login QR code.
#[must_use]
pub fn encode(sid: &SessionId) -> String {
    format!("{LOGIN_NAMESPACE}{sid}")
}

/// Classifies a raw event key.
///
/// Keys without the login namespace, or whose session part is not a valid
/// [`SessionId`], are [`ScanKey::Unrelated`].
#[must_use]
pub fn decode(raw_event_key: &str) -> ScanKey {
    let key = raw_event_key
        .strip_prefix(SUBSCRIBE_PREFIX)
        .unwrap_or(raw_event_key);

    key.strip_prefix(LOGIN_NAMESPACE)
        .and_then(|sid| sid.parse::<SessionId>().ok())
        .map_or(ScanKey::Unrelated, ScanKey::Login)
}
