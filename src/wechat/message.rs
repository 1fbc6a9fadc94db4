use serde::Deserialize;

use crate::error::Error;
use crate::types::OpenId;

/// Wire shape of a plaintext push message; unknown elements are ignored.
#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "ToUserName")]
    to_user_name: String,
    #[serde(rename = "FromUserName")]
    from_user_name: String,
    #[serde(rename = "CreateTime", default)]
    create_time: i64,
    #[serde(rename = "MsgType")]
    msg_type: String,
    #[serde(rename = "Content", default)]
    content: Option<String>,
    #[serde(rename = "Event", default)]
    event: Option<String>,
    #[serde(rename = "EventKey", default)]
    event_key: Option<String>,
}

/// Wire shape of an encrypted push message.
#[derive(Deserialize)]
pub(crate) struct EncryptedEnvelope {
    #[serde(rename = "Encrypt")]
    pub(crate) encrypt: String,
}

impl EncryptedEnvelope {
    pub(crate) fn parse_xml(xml: &str) -> Result<Self, Error> {
        quick_xml::de::from_str(xml).map_err(|e| Error::Message(e.to_string()))
    }
}

/// Push event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// User followed the account, possibly by scanning a parametric QR code.
    Subscribe,
    /// Existing follower scanned a parametric QR code.
    Scan,
    Unsubscribe,
    Other(String),
}

impl EventKind {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("subscribe") {
            Self::Subscribe
        } else if raw.eq_ignore_ascii_case("scan") {
            Self::Scan
        } else if raw.eq_ignore_ascii_case("unsubscribe") {
            Self::Unsubscribe
        } else {
            Self::Other(raw.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text { content: String },
    Event { event: EventKind, key: Option<String> },
    /// Image, voice, location and every other message type.
    Other { msg_type: String },
}

/// Verified, decoded push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Official account id (`gh_...`).
    pub to_user: String,
    /// Sender's openid.
    pub from_user: OpenId,
    pub create_time: i64,
    pub kind: MessageKind,
}

impl InboundMessage {
    /// Parses a plaintext push message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Message`] if the XML is malformed or lacks a required element.
    pub fn parse_xml(xml: &str) -> Result<Self, Error> {
        let raw: RawMessage =
            quick_xml::de::from_str(xml).map_err(|e| Error::Message(e.to_string()))?;

        let kind = match raw.msg_type.as_str() {
            "text" => MessageKind::Text {
                content: raw.content.unwrap_or_default(),
            },
            "event" => MessageKind::Event {
                event: EventKind::parse(raw.event.as_deref().unwrap_or_default()),
                key: raw.event_key.filter(|k| !k.is_empty()),
            },
            other => MessageKind::Other {
                msg_type: other.to_string(),
            },
        };

        Ok(Self {
            to_user: raw.to_user_name,
            from_user: OpenId(raw.from_user_name),
            create_time: raw.create_time,
            kind,
        })
    }
}

/// Passive text reply, sent back in the webhook response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub to_user: OpenId,
    pub from_user: String,
    pub create_time: i64,
    pub content: String,
}

impl Reply {
    /// Text reply addressed back to the sender of `msg`.
    #[must_use]
    pub fn text_to(msg: &InboundMessage, content: impl Into<String>) -> Self {
        Self {
            to_user: msg.from_user.clone(),
            from_user: msg.to_user.clone(),
            create_time: time::OffsetDateTime::now_utc().unix_timestamp(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn to_xml(&self) -> String {
        format!(
            "<xml><ToUserName>{}</ToUserName><FromUserName>{}</FromUserName>\
             <CreateTime>{}</CreateTime><MsgType><![CDATA[text]]></MsgType>\
             <Content>{}</Content></xml>",
            cdata(&self.to_user.0),
            cdata(&self.from_user),
            self.create_time,
            cdata(&self.content),
        )
    }
}

/// Wraps `text` in CDATA, splitting any embedded terminator.
pub(crate) fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}
