//! Password-gated HTTP control panel.
//!
//! ```text
//! GET  /        login page (redirects to /panel when already logged in)
//! POST /login   password → session cookie → 303 /panel
//! GET  /panel   send form + state          (session)
//! POST /send    post a message verbatim    (session)
//! POST /reset   forget the last document   (session or password)
//! GET  /status  JSON state + counters      (session)
//! GET  /logout  revoke session → 303 /
//! ```
//!
//! Every mutating route is POST and answers with a redirect, so reloading
//! the page never repeats a send.

pub mod pages;
pub mod session;

use crate::chat::Outbound;
use crate::config::ControlConfig;
use crate::error::WatchError;
use crate::scheduler::SchedulerStatus;
use crate::state::{StateStore, WatchState};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use session::{clear_session_cookie, constant_time_eq, session_cookie, session_token, OperatorSession, SessionStore};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state behind every control route.
pub struct ControlState {
    pub(crate) password: String,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) outbound: Outbound,
    pub(crate) store: Arc<StateStore>,
    pub(crate) scheduler: Option<watch::Receiver<SchedulerStatus>>,
}

impl ControlState {
    pub fn new(
        password: impl Into<String>,
        sessions: Arc<dyn SessionStore>,
        outbound: Outbound,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            password: password.into(),
            sessions,
            outbound,
            store,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, status: watch::Receiver<SchedulerStatus>) -> Self {
        self.scheduler = Some(status);
        self
    }

    fn password_matches(&self, candidate: &str) -> bool {
        constant_time_eq(candidate.as_bytes(), self.password.as_bytes())
    }

    fn scheduler_status(&self) -> Option<SchedulerStatus> {
        self.scheduler.as_ref().map(|rx| rx.borrow().clone())
    }
}

/// Build the control router.
pub fn router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", post(login))
        .route("/panel", get(panel))
        .route("/send", post(send))
        .route("/reset", post(reset))
        .route("/status", get(status))
        .route("/logout", get(logout))
        .with_state(state)
        // Method + path only; form bodies carry the password.
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<axum::body::Body>| {
                tracing::info_span!(
                    "control_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

/// Serve the panel until `shutdown` resolves.
pub async fn serve<F>(config: &ControlConfig, state: Arc<ControlState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Control panel listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[derive(Deserialize)]
struct LoginForm {
    password: String,
}

#[derive(Deserialize)]
struct SendForm {
    message: String,
}

#[derive(Deserialize)]
struct ResetForm {
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct PanelQuery {
    notice: Option<String>,
}

#[derive(Serialize)]
struct StatusView {
    state: WatchState,
    scheduler: Option<SchedulerStatus>,
}

fn see_other_with_cookie(location: &str, cookie: String) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location.to_string()), (header::SET_COOKIE, cookie)],
    )
        .into_response()
}

async fn index(State(state): State<Arc<ControlState>>, headers: HeaderMap) -> Response {
    match session_token(&headers) {
        Some(token) if state.sessions.is_valid(token) => Redirect::to("/panel").into_response(),
        _ => Html(pages::render_login(None)).into_response(),
    }
}

async fn login(State(state): State<Arc<ControlState>>, Form(form): Form<LoginForm>) -> Response {
    if !state.password_matches(&form.password) {
        warn!("Control panel login rejected: {}", WatchError::AuthFailed);
        return (
            StatusCode::UNAUTHORIZED,
            Html(pages::render_login(Some("Wrong password"))),
        )
            .into_response();
    }
    let token = state.sessions.create();
    info!("Operator logged in");
    see_other_with_cookie("/panel", session_cookie(&token))
}

async fn panel(
    _session: OperatorSession,
    State(state): State<Arc<ControlState>>,
    Query(query): Query<PanelQuery>,
) -> Html<String> {
    let notice = match query.notice.as_deref() {
        Some("sent") => Some("Message sent"),
        Some("reset") => Some("State reset; the current document will be republished on the next cycle"),
        _ => None,
    };
    let status = state.scheduler_status();
    Html(pages::render_panel(&state.store.snapshot(), status.as_ref(), notice))
}

async fn send(
    _session: OperatorSession,
    State(state): State<Arc<ControlState>>,
    Form(form): Form<SendForm>,
) -> Response {
    if form.message.trim().is_empty() {
        return Redirect::to("/panel").into_response();
    }
    match state.outbound.send_text(&form.message).await {
        Ok(()) => {
            info!("Operator message sent ({} chars)", form.message.chars().count());
            Redirect::to("/panel?notice=sent").into_response()
        }
        Err(e) => {
            warn!("Operator message failed: {}", e);
            (StatusCode::BAD_GATEWAY, Html(pages::render_error(&e.to_string()))).into_response()
        }
    }
}

async fn reset(
    State(state): State<Arc<ControlState>>,
    headers: HeaderMap,
    Form(form): Form<ResetForm>,
) -> Response {
    let by_session = session_token(&headers).is_some_and(|t| state.sessions.is_valid(t));
    if !by_session && !state.password_matches(&form.password) {
        warn!("Reset rejected: {}", WatchError::AuthFailed);
        return (
            StatusCode::UNAUTHORIZED,
            Html(pages::render_login(Some("Wrong password"))),
        )
            .into_response();
    }
    match state.store.reset().await {
        Ok(()) => Redirect::to("/panel?notice=reset").into_response(),
        Err(e) => {
            warn!("Reset could not be persisted: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::render_error(&e.to_string()))).into_response()
        }
    }
}

async fn status(_session: OperatorSession, State(state): State<Arc<ControlState>>) -> Json<serde_json::Value> {
    let view = StatusView {
        state: state.store.snapshot(),
        scheduler: state.scheduler_status(),
    };
    Json(serde_json::to_value(view).unwrap_or_default())
}

async fn logout(State(state): State<Arc<ControlState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(token);
        info!("Operator logged out");
    }
    see_other_with_cookie("/", clear_session_cookie())
}
