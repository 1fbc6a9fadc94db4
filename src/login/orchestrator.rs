use std::sync::Arc;

use serde::Serialize;
use url::Url;

use super::config::{Features, QrMode};
use super::error::LoginError;
use super::links::Links;
use super::publisher::StatusResponse;
use crate::platform::{Platform, Profile};
use crate::scene::{self, ScanKey};
use crate::sid::new_session_id;
use crate::store::SessionStore;
use crate::types::{OpenId, SessionId};
use crate::wechat::{EventKind, InboundMessage, MessageKind, Reply};

/// A freshly issued login QR code.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCode {
    pub sid: SessionId,
    /// QR image: platform-hosted URL, or `data:` URI when rendered locally.
    pub artifact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Pairs QR issuance, scan events, consent redirects and status polls
/// around a session id.
///
/// The only shared state is the [`SessionStore`]; every entry point is safe to
/// run concurrently with every other.
pub struct Orchestrator<P, S> {
    platform: Arc<P>,
    store: Arc<S>,
    features: Features,
}

impl<P: Platform, S: SessionStore> Orchestrator<P, S> {
    #[must_use]
    pub fn new(platform: Arc<P>, store: Arc<S>, features: Features) -> Self {
        Self {
            platform,
            store,
            features,
        }
    }

    #[must_use]
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Issues a QR code for `requested` (re-display) or a new session id.
    ///
    /// # Errors
    ///
    /// [`LoginError::InvalidSessionId`] for a malformed `requested` id,
    /// [`LoginError::Issuance`] if the platform or the renderer fails. The
    /// store is never touched.
    pub async fn issue_code(
        &self,
        requested: Option<&str>,
        links: &Links,
    ) -> Result<IssuedCode, LoginError> {
        let sid = match requested.filter(|s| !s.is_empty()) {
            Some(raw) => raw
                .parse::<SessionId>()
                .map_err(|_| LoginError::InvalidSessionId)?,
            None => new_session_id(),
        };

        match self.features.qr_mode {
            QrMode::PlatformTicket => {
                let ticket = self
                    .platform
                    .create_qr_ticket(&scene::encode(&sid), self.features.qr_expire_seconds)
                    .await
                    .map_err(LoginError::Issuance)?;
                tracing::info!(sid = %sid, "Issued login QR ticket");
                Ok(IssuedCode {
                    artifact: self.platform.qr_image_url(&ticket),
                    expires_in: ticket.expire_seconds,
                    sid,
                })
            }
            QrMode::ConsentLink => {
                let link = links.consent(&sid);
                tracing::info!(sid = %sid, link = %link, "Issued consent-link QR");
                Ok(IssuedCode {
                    artifact: render_qr(&link)?,
                    expires_in: None,
                    sid,
                })
            }
        }
    }

    /// Current login state for a polled session id.
    ///
    /// An id that was never issued, or whose login expired, is `waiting`.
    ///
    /// # Errors
    ///
    /// [`LoginError::MissingSessionId`] or [`LoginError::InvalidSessionId`].
    pub async fn poll_status(&self, sid: Option<&str>) -> Result<StatusResponse, LoginError> {
        let sid = parse_required(sid)?;
        Ok(self.store.get(&sid).await.into())
    }

    /// Handles one verified push message and returns the passive reply, if any.
    ///
    /// Messages unrelated to login are never errors.
    pub async fn ingest_event(&self, msg: &InboundMessage) -> Option<Reply> {
        match &msg.kind {
            MessageKind::Text { content } => self
                .features
                .echo_text
                .then(|| Reply::text_to(msg, format!("You sent: {content}"))),
            MessageKind::Event {
                event: event @ (EventKind::Subscribe | EventKind::Scan),
                key,
            } => {
                match key.as_deref().map_or(ScanKey::Unrelated, scene::decode) {
                    ScanKey::Login(sid) => self.record_scan(&sid, &msg.from_user).await,
                    ScanKey::Unrelated => {
                        tracing::debug!(event = ?event, key = ?key, "Scan event without login scene");
                    }
                }
                if *event == EventKind::Subscribe {
                    self.features
                        .welcome
                        .as_ref()
                        .map(|welcome| Reply::text_to(msg, welcome.clone()))
                } else {
                    None
                }
            }
            other => {
                tracing::debug!(kind = ?other, "Ignoring push message");
                None
            }
        }
    }

    async fn record_scan(&self, sid: &SessionId, openid: &OpenId) {
        if openid.0.is_empty() {
            tracing::warn!(sid = %sid, "Login scan without sender openid");
            return;
        }

        let unionid = if self.features.enrich_on_scan {
            match self.platform.subscriber_info(openid).await {
                Ok(profile) => profile.unionid,
                Err(e) => {
                    tracing::warn!(sid = %sid, error = %e, "Unionid lookup failed; recording openid only");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(sid = %sid, openid = %openid, has_unionid = unionid.is_some(), "Login QR scanned");
        self.store.put_scanned(sid, openid.clone(), unionid).await;
    }

    /// Builds the platform consent URL carrying `sid` as the round-trip state.
    ///
    /// # Errors
    ///
    /// [`LoginError::Disabled`] when consent is off, or a missing/invalid sid.
    pub fn start_redirect(&self, sid: Option<&str>, links: &Links) -> Result<Url, LoginError> {
        if !self.features.consent {
            return Err(LoginError::Disabled);
        }
        let sid = parse_required(sid)?;
        let url = self.platform.authorize_url(&links.callback(), &sid);
        tracing::info!(sid = %sid, "Starting consent redirect");
        Ok(url)
    }

    /// Exchanges `code` and correlates the resolved identity with `state`.
    ///
    /// A missing, empty or malformed `state` still resolves the identity; it
    /// just isn't tied to any polling session.
    ///
    /// # Errors
    ///
    /// [`LoginError::Disabled`] when consent is off, [`LoginError::Authorization`]
    /// if the code exchange or profile lookup fails.
    pub async fn complete_redirect(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> Result<Profile, LoginError> {
        if !self.features.consent {
            return Err(LoginError::Disabled);
        }

        let token = self
            .platform
            .exchange_code(code)
            .await
            .map_err(LoginError::Authorization)?;
        let mut profile = self
            .platform
            .oauth_profile(&token)
            .await
            .map_err(LoginError::Authorization)?;
        if profile.unionid.is_none() {
            profile.unionid = token.unionid;
        }

        match state.filter(|s| !s.is_empty()).map(str::parse::<SessionId>) {
            None => {
                tracing::info!(openid = %profile.openid, "Consent completed without session state");
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Consent completed with malformed state");
            }
            Some(Ok(sid)) => {
                tracing::info!(sid = %sid, openid = %profile.openid, "Consent completed");
                self.store
                    .put_scanned(&sid, profile.openid.clone(), profile.unionid.clone())
                    .await;
            }
        }
        Ok(profile)
    }
}

fn parse_required(sid: Option<&str>) -> Result<SessionId, LoginError> {
    sid.filter(|s| !s.is_empty())
        .ok_or(LoginError::MissingSessionId)?
        .parse()
        .map_err(|_| LoginError::InvalidSessionId)
}

#[cfg(feature = "qr-image")]
fn render_qr(link: &Url) -> Result<String, LoginError> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use qrcode::QrCode;
    use qrcode::render::svg;

    let code = QrCode::new(link.as_str().as_bytes())
        .map_err(|e| LoginError::Issuance(e.into()))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

#[cfg(not(feature = "qr-image"))]
fn render_qr(link: &Url) -> Result<String, LoginError> {
    Ok(link.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::platform::{OAuthToken, QrTicket};
    use crate::store::MemoryStore;
    use crate::types::UnionId;

    #[derive(Default)]
    struct FakePlatform {
        fail_issuance: bool,
        fail_lookup: bool,
        fail_exchange: bool,
    }

    impl Platform for FakePlatform {
        async fn create_qr_ticket(&self, scene: &str, expire_seconds: u32) -> Result<QrTicket, Error> {
            if self.fail_issuance {
                return Err(Error::Api {
                    operation: "qrcode create",
                    errcode: 45009,
                    errmsg: "api freq out of limit".into(),
                });
            }
            Ok(QrTicket::new(format!("ticket-{scene}")).with_expire_seconds(u64::from(expire_seconds)))
        }

        fn qr_image_url(&self, ticket: &QrTicket) -> String {
            format!("https://qr.test/{}", ticket.ticket)
        }

        async fn subscriber_info(&self, openid: &OpenId) -> Result<Profile, Error> {
            if self.fail_lookup {
                return Err(Error::Api {
                    operation: "user info",
                    errcode: -1,
                    errmsg: "system busy".into(),
                });
            }
            Ok(Profile::new(openid.clone()).with_unionid(UnionId(format!("U-{openid}"))))
        }

        fn authorize_url(&self, redirect_uri: &Url, state: &SessionId) -> Url {
            let mut url: Url = "https://consent.test/authorize".parse().unwrap();
            url.query_pairs_mut()
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("state", state.as_str());
            url
        }

        async fn exchange_code(&self, code: &str) -> Result<OAuthToken, Error> {
            if self.fail_exchange {
                return Err(Error::Api {
                    operation: "token exchange",
                    errcode: 40029,
                    errmsg: "invalid code".into(),
                });
            }
            Ok(OAuthToken::new(format!("token-{code}"), OpenId("OAUTH_OPENID".into())))
        }

        async fn oauth_profile(&self, token: &OAuthToken) -> Result<Profile, Error> {
            Ok(Profile::new(token.openid.clone()).with_unionid(UnionId("OAUTH_UNION".into())))
        }
    }

    fn setup(
        platform: FakePlatform,
        features: Features,
    ) -> (Orchestrator<FakePlatform, MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let orchestrator = Orchestrator::new(Arc::new(platform), store.clone(), features);
        (orchestrator, store)
    }

    fn links() -> Links {
        Links::new("https://login.test".parse().unwrap(), "/login")
    }

    fn event(event: &str, key: &str, from: &str) -> InboundMessage {
        InboundMessage::parse_xml(&format!(
            "<xml><ToUserName>gh_account</ToUserName><FromUserName>{from}</FromUserName>\
             <CreateTime>1</CreateTime><MsgType>event</MsgType><Event>{event}</Event>\
             <EventKey>{key}</EventKey></xml>"
        ))
        .unwrap()
    }

    fn sid(s: &str) -> SessionId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn scan_flow_end_to_end() {
        let (orchestrator, _) = setup(FakePlatform::default(), Features::default());

        let issued = orchestrator.issue_code(None, &links()).await.unwrap();
        assert_eq!(issued.sid.as_str().len(), 32);
        assert_eq!(
            issued.artifact,
            format!("https://qr.test/ticket-login:{}", issued.sid)
        );

        let status = orchestrator.poll_status(Some(issued.sid.as_str())).await.unwrap();
        assert_eq!(status, StatusResponse::Waiting);

        let msg = event("SCAN", &format!("qrscene_login:{}", issued.sid), "OPENID123");
        assert!(orchestrator.ingest_event(&msg).await.is_none());

        match orchestrator.poll_status(Some(issued.sid.as_str())).await.unwrap() {
            StatusResponse::Scanned {
                identity,
                secondary_identity,
                ..
            } => {
                assert_eq!(identity, OpenId("OPENID123".into()));
                assert_eq!(secondary_identity, Some(UnionId("U-OPENID123".into())));
            }
            other => panic!("expected scanned, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn requested_sid_is_reused() {
        let (orchestrator, _) = setup(FakePlatform::default(), Features::default());

        let first = orchestrator.issue_code(Some("fixed-sid"), &links()).await.unwrap();
        let second = orchestrator.issue_code(Some("fixed-sid"), &links()).await.unwrap();

        assert_eq!(first.sid, sid("fixed-sid"));
        assert_eq!(second.sid, sid("fixed-sid"));
        assert_eq!(first.expires_in, Some(600));
    }

    #[tokio::test]
    async fn malformed_requested_sid_is_rejected() {
        let (orchestrator, _) = setup(FakePlatform::default(), Features::default());
        let result = orchestrator.issue_code(Some("<script>"), &links()).await;
        assert!(matches!(result, Err(LoginError::InvalidSessionId)));
    }

    #[tokio::test]
    async fn issuance_failure_surfaces_without_store_write() {
        let platform = FakePlatform {
            fail_issuance: true,
            ..FakePlatform::default()
        };
        let (orchestrator, store) = setup(platform, Features::default());

        let result = orchestrator.issue_code(Some("s1"), &links()).await;

        assert!(matches!(result, Err(LoginError::Issuance(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn poll_requires_sid() {
        let (orchestrator, _) = setup(FakePlatform::default(), Features::default());

        assert!(matches!(
            orchestrator.poll_status(None).await,
            Err(LoginError::MissingSessionId)
        ));
        assert!(matches!(
            orchestrator.poll_status(Some("")).await,
            Err(LoginError::MissingSessionId)
        ));
        assert_eq!(
            orchestrator.poll_status(Some("never-issued")).await.unwrap(),
            StatusResponse::Waiting
        );
    }

    #[tokio::test]
    async fn unrelated_scan_is_ignored() {
        let (orchestrator, store) = setup(FakePlatform::default(), Features::default());

        let reply = orchestrator
            .ingest_event(&event("SCAN", "qrscene_unknown-marker", "OPENID123"))
            .await;

        assert!(reply.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn lookup_failure_still_records_openid() {
        let platform = FakePlatform {
            fail_lookup: true,
            ..FakePlatform::default()
        };
        let (orchestrator, store) = setup(platform, Features::default());

        orchestrator
            .ingest_event(&event("SCAN", "login:s1", "OPENID123"))
            .await;

        let outcome = store.get(&sid("s1")).await.unwrap();
        assert_eq!(outcome.openid, OpenId("OPENID123".into()));
        assert_eq!(outcome.unionid, None);
    }

    #[tokio::test]
    async fn enrichment_can_be_disabled() {
        let features = Features::default().with_enrich_on_scan(false);
        let (orchestrator, store) = setup(FakePlatform::default(), features);

        orchestrator
            .ingest_event(&event("SCAN", "login:s1", "OPENID123"))
            .await;

        assert_eq!(store.get(&sid("s1")).await.unwrap().unionid, None);
    }

    #[tokio::test]
    async fn subscribe_records_and_welcomes() {
        let (orchestrator, store) = setup(FakePlatform::default(), Features::default());

        let reply = orchestrator
            .ingest_event(&event("subscribe", "qrscene_login:s1", "OPENID123"))
            .await
            .expect("welcome reply");

        assert_eq!(reply.content, "Thanks for following!");
        assert_eq!(reply.to_user, OpenId("OPENID123".into()));
        assert!(store.get(&sid("s1")).await.is_some());
    }

    #[tokio::test]
    async fn plain_subscribe_still_welcomes() {
        let (orchestrator, store) = setup(FakePlatform::default(), Features::default());

        let reply = orchestrator.ingest_event(&event("subscribe", "", "OPENID123")).await;

        assert!(reply.is_some());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn text_is_echoed_when_enabled() {
        let text = InboundMessage::parse_xml(
            "<xml><ToUserName>gh</ToUserName><FromUserName>OPENID</FromUserName>\
             <CreateTime>1</CreateTime><MsgType>text</MsgType><Content>login:s1</Content></xml>",
        )
        .unwrap();

        let (orchestrator, store) = setup(FakePlatform::default(), Features::default());
        let reply = orchestrator.ingest_event(&text).await.unwrap();
        assert_eq!(reply.content, "You sent: login:s1");
        assert!(store.is_empty().await);

        let quiet = Features::default().with_echo_text(false);
        let (orchestrator, _) = setup(FakePlatform::default(), quiet);
        assert!(orchestrator.ingest_event(&text).await.is_none());
    }

    #[tokio::test]
    async fn redirect_round_trip_enriches_session() {
        let (orchestrator, store) = setup(FakePlatform::default(), Features::default());
        orchestrator
            .ingest_event(&event("SCAN", "login:s1", "OPENID123"))
            .await;

        let url = orchestrator.start_redirect(Some("s1"), &links()).unwrap();
        assert!(url.as_str().contains("state=s1"));
        assert!(url.as_str().contains("login.test%2Flogin%2Fcallback"));

        let profile = orchestrator.complete_redirect("CODE", Some("s1")).await.unwrap();
        assert_eq!(profile.unionid, Some(UnionId("OAUTH_UNION".into())));

        let outcome = store.get(&sid("s1")).await.unwrap();
        assert_eq!(outcome.openid, OpenId("OAUTH_OPENID".into()));
        assert_eq!(outcome.unionid, Some(UnionId("OAUTH_UNION".into())));
    }

    #[tokio::test]
    async fn redirect_without_state_creates_no_entry() {
        let (orchestrator, store) = setup(FakePlatform::default(), Features::default());

        let profile = orchestrator.complete_redirect("CODE", Some("")).await.unwrap();

        assert_eq!(profile.openid, OpenId("OAUTH_OPENID".into()));
        assert!(store.is_empty().await);

        orchestrator.complete_redirect("CODE", None).await.unwrap();
        orchestrator
            .complete_redirect("CODE", Some("bad state"))
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn exchange_failure_is_authorization_error() {
        let platform = FakePlatform {
            fail_exchange: true,
            ..FakePlatform::default()
        };
        let (orchestrator, store) = setup(platform, Features::default());

        let result = orchestrator.complete_redirect("BAD", Some("s1")).await;

        assert!(matches!(result, Err(LoginError::Authorization(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn consent_flow_can_be_disabled() {
        let features = Features::default().with_consent(false);
        let (orchestrator, _) = setup(FakePlatform::default(), features);

        assert!(matches!(
            orchestrator.start_redirect(Some("s1"), &links()),
            Err(LoginError::Disabled)
        ));
        assert!(matches!(
            orchestrator.complete_redirect("CODE", Some("s1")).await,
            Err(LoginError::Disabled)
        ));
    }

    #[tokio::test]
    async fn consent_link_mode_skips_platform() {
        let features = Features::default().with_qr_mode(QrMode::ConsentLink);
        let (orchestrator, _) = setup(FakePlatform::default(), features);

        let issued = orchestrator.issue_code(Some("s1"), &links()).await.unwrap();

        #[cfg(feature = "qr-image")]
        assert!(issued.artifact.starts_with("data:image/svg+xml;base64,"));
        #[cfg(not(feature = "qr-image"))]
        assert_eq!(issued.artifact, "https://login.test/login/consent?sid=s1");
        assert_eq!(issued.expires_in, None);
    }
}
