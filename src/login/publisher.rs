use serde::Serialize;
use time::OffsetDateTime;

use crate::types::{LoginOutcome, OpenId, UnionId};

/// Poll response for one session id.
///
/// ```json
/// {"status":"waiting"}
/// {"status":"scanned","identity":"o6_bm...","secondary_identity":"oFZ...","scanned_at":"2024-05-01T08:00:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusResponse {
    Waiting,
    Scanned {
        identity: OpenId,
        #[serde(skip_serializing_if = "Option::is_none")]
        secondary_identity: Option<UnionId>,
        #[serde(with = "time::serde::rfc3339")]
        scanned_at: OffsetDateTime,
    },
}

impl From<Option<LoginOutcome>> for StatusResponse {
    fn from(outcome: Option<LoginOutcome>) -> Self {
        match outcome {
            None => Self::Waiting,
            Some(outcome) => Self::Scanned {
                identity: outcome.openid,
                secondary_identity: outcome.unionid,
                scanned_at: outcome.scanned_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn waiting_shape() {
        let json = serde_json::to_value(StatusResponse::from(None)).unwrap();
        assert_eq!(json, json!({ "status": "waiting" }));
    }

    #[test]
    fn scanned_shape() {
        let outcome = LoginOutcome {
            openid: OpenId("OPENID123".into()),
            unionid: Some(UnionId("UNION".into())),
            scanned_at: OffsetDateTime::from_unix_timestamp(1_714_550_400).unwrap(),
        };
        let json = serde_json::to_value(StatusResponse::from(Some(outcome))).unwrap();

        assert_eq!(
            json,
            json!({
                "status": "scanned",
                "identity": "OPENID123",
                "secondary_identity": "UNION",
                "scanned_at": "2024-05-01T08:00:00Z"
            })
        );
    }

    #[test]
    fn scanned_without_unionid_omits_field() {
        let outcome = LoginOutcome {
            openid: OpenId("OPENID123".into()),
            unionid: None,
            scanned_at: OffsetDateTime::from_unix_timestamp(0).unwrap(),
        };
        let json = serde_json::to_value(StatusResponse::from(Some(outcome))).unwrap();

        assert!(json.get("secondary_identity").is_none());
        assert_eq!(json["identity"], "OPENID123");
    }
}
