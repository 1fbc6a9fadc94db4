use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;

use super::config::LoginConfig;
use super::error::LoginError;
use super::links::Links;
use super::orchestrator::Orchestrator;
use super::pages;
use super::state::LoginState;
use crate::platform::Platform;
use crate::store::SessionStore;
use crate::types::SessionId;
use crate::wechat::WebhookParams;

/// Create the scan-login router.
///
/// `store` is shared so the caller can run [`spawn_sweeper`](crate::store::spawn_sweeper)
/// against the same instance.
pub fn login_routes<P, S>(config: LoginConfig, platform: P, store: Arc<S>) -> Router
where
    P: Platform,
    S: SessionStore,
{
    let base = config.settings.base_path.clone();
    let consent = config.features.consent;

    let state = LoginState {
        orchestrator: Arc::new(Orchestrator::new(
            Arc::new(platform),
            store,
            config.features,
        )),
        webhook: Arc::new(config.webhook),
        settings: config.settings,
    };

    let page_path = if base.is_empty() { "/".to_string() } else { base.clone() };

    let mut router = Router::new()
        .route(&page_path, get(login_page::<P, S>))
        .route(&format!("{base}/qr"), get(issue_code::<P, S>))
        .route(&format!("{base}/status"), get(poll_status::<P, S>))
        .route(
            &format!("{base}/callback"),
            get(callback::<P, S>).post(callback::<P, S>),
        );

    if consent {
        router = router
            .route(&format!("{base}/consent"), get(consent_page::<P, S>))
            .route(&format!("{base}/redirect-start"), get(redirect_start::<P, S>));
    }

    router.with_state(state)
}

#[derive(Deserialize)]
struct SidParams {
    sid: Option<String>,
}

impl SidParams {
    fn sid(&self) -> Option<&str> {
        self.sid.as_deref().filter(|s| !s.is_empty())
    }
}

fn links<P, S>(state: &LoginState<P, S>, headers: &HeaderMap) -> Links {
    Links::from_request(
        state.settings.public_url.as_ref(),
        headers,
        &state.settings.base_path,
    )
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn page_redirect(base_path: &str) -> Response {
    found(if base_path.is_empty() { "/" } else { base_path })
}

// ── Page ───────────────────────────────────────────────────────────

async fn login_page<P: Platform, S: SessionStore>(
    State(state): State<LoginState<P, S>>,
) -> Html<String> {
    Html(pages::login_page(
        &state.settings.base_path,
        state.orchestrator.features().consent,
    ))
}

// ── Issue / Poll ───────────────────────────────────────────────────

async fn issue_code<P: Platform, S: SessionStore>(
    State(state): State<LoginState<P, S>>,
    Query(params): Query<SidParams>,
    headers: HeaderMap,
) -> Result<Response, LoginError> {
    let links = links(&state, &headers);
    let issued = state.orchestrator.issue_code(params.sid(), &links).await?;
    Ok(([(CACHE_CONTROL, "no-store")], Json(issued)).into_response())
}

async fn poll_status<P: Platform, S: SessionStore>(
    State(state): State<LoginState<P, S>>,
    Query(params): Query<SidParams>,
) -> Result<Response, LoginError> {
    let status = state.orchestrator.poll_status(params.sid()).await?;
    Ok(([(CACHE_CONTROL, "no-store")], Json(status)).into_response())
}

// ── Consent ────────────────────────────────────────────────────────

async fn consent_page<P: Platform, S: SessionStore>(
    State(state): State<LoginState<P, S>>,
    Query(params): Query<SidParams>,
) -> Result<Response, LoginError> {
    let Some(raw) = params.sid() else {
        return Ok(page_redirect(&state.settings.base_path));
    };
    let sid: SessionId = raw.parse().map_err(|_| LoginError::InvalidSessionId)?;
    Ok(Html(pages::consent_page(&state.settings.base_path, &sid)).into_response())
}

async fn redirect_start<P: Platform, S: SessionStore>(
    State(state): State<LoginState<P, S>>,
    Query(params): Query<SidParams>,
    headers: HeaderMap,
) -> Result<Response, LoginError> {
    if params.sid().is_none() {
        return Ok(page_redirect(&state.settings.base_path));
    }
    let links = links(&state, &headers);
    let url = state.orchestrator.start_redirect(params.sid(), &links)?;
    Ok(found(url.as_str()))
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
}

/// Shared callback URL: consent redirects carry `code`, everything else is a
/// platform push request.
async fn callback<P: Platform, S: SessionStore>(
    State(state): State<LoginState<P, S>>,
    method: Method,
    Query(redirect): Query<RedirectParams>,
    Query(params): Query<WebhookParams>,
    body: String,
) -> Result<Response, LoginError> {
    if let Some(code) = redirect.code.as_deref().filter(|c| !c.is_empty()) {
        let profile = state
            .orchestrator
            .complete_redirect(code, redirect.state.as_deref())
            .await?;
        return Ok(Html(pages::completion_page(&profile)).into_response());
    }

    if method == Method::GET {
        let echostr = state.webhook.verify_url(&params)?;
        tracing::info!("Webhook URL verified");
        return Ok(echostr.into_response());
    }

    let opened = state.webhook.open(&params, &body)?;
    let Some(reply) = state.orchestrator.ingest_event(&opened.message).await else {
        return Ok("success".into_response());
    };
    let sealed = state
        .webhook
        .seal(&reply.to_xml(), opened.encrypted, &params)?;
    Ok(([(CONTENT_TYPE, "application/xml")], sealed).into_response())
}
