//! HTTP server
//!
//! Every path is served by one [`PageHub`]: `GET`/`POST` render the page,
//! requests carrying `__execute_event__` run an event. Form bodies
//! (urlencoded or multipart) and cookies are read into [`RequestData`]
//! before the synchronous page/event code runs.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Multipart, State},
    http::{header, HeaderMap, Request, Response, StatusCode},
    response::{Html, IntoResponse, Json},
    routing::any,
    Router,
};
use tokio::net::TcpListener;

use super::hub::{default_layout, PageHub};
use super::{Ctx, RequestData};
use crate::stateful::Runtime;

/// Errors surfaced to HTTP clients
#[derive(Debug)]
pub enum WebError {
    BodyRead(String),
    Form(String),
    Page(anyhow::Error),
    Event(anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response<Body> {
        match self {
            WebError::BodyRead(msg) | WebError::Form(msg) => {
                tracing::error!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            WebError::Page(err) => {
                tracing::error!("Page failed: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")).into_response()
            }
            WebError::Event(err) => {
                tracing::error!("Event failed: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": format!("{err:#}") })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Clone)]
struct AppState {
    runtime: Arc<Runtime>,
    hub: Arc<PageHub>,
    max_form_size: usize,
}

/// Router serving `hub` on every path
pub fn router(runtime: Arc<Runtime>, hub: PageHub, max_form_size: usize) -> Router {
    let state = AppState {
        runtime,
        hub: Arc::new(hub),
        max_form_size,
    };
    Router::new()
        .route("/", any(handle))
        .route("/*path", any(handle))
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(bind_addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn handle(State(state): State<AppState>, req: Request<Body>) -> Result<Response<Body>, WebError> {
    let (parts, body) = req.into_parts();

    let body = axum::body::to_bytes(body, state.max_form_size)
        .await
        .map_err(|e| WebError::BodyRead(e.to_string()))?;

    let request = RequestData {
        path: parts.uri.path().to_string(),
        raw_query: parts.uri.query().unwrap_or_default().to_string(),
        cookies: parse_cookies(&parts.headers),
        form: read_form(&parts.headers, body).await?,
    };
    tracing::debug!("{} {}", parts.method, parts.uri);

    let ctx = Ctx::new(state.runtime.clone(), request);
    if ctx.request().is_event() {
        let envelope = state.hub.execute_event(&ctx).map_err(WebError::Event)?;
        return Ok(Json(envelope).into_response());
    }

    let page = state.hub.render_page(&ctx).map_err(WebError::Page)?;
    let html = default_layout(&ctx, &page).map_err(WebError::Page)?;
    Ok(Html(html).into_response())
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

async fn read_form(headers: &HeaderMap, body: Bytes) -> Result<HashMap<String, Vec<String>>, WebError> {
    let mut form: HashMap<String, Vec<String>> = HashMap::new();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        for (key, value) in url::form_urlencoded::parse(&body) {
            form.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    } else if content_type.starts_with("multipart/form-data") {
        let req = Request::builder()
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .map_err(|e| WebError::Form(e.to_string()))?;
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| WebError::Form(e.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| WebError::Form(e.body_text()))?
        {
            // uploads are not part of the form map
            if field.file_name().is_some() {
                continue;
            }
            let name = field.name().unwrap_or_default().to_string();
            let value = field
                .text()
                .await
                .map_err(|e| WebError::Form(e.body_text()))?;
            form.entry(name).or_default().push(value);
        }
    }
    Ok(form)
}
