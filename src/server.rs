//! HTTP server for the site's dynamic endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/subscribe` | Newsletter signup proxy (form-encoded) |
//! | `GET`  | `/rss.xml` | RSS 2.0 feed of published posts |
//! | `GET`  | `/api/search-index.json` | Documents fed to the search index |
//! | `GET`  | `/api/search?q=` | Query the built search index |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Errors on every route except `/api/subscribe` use one envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `index_missing` (404), `internal` (500).
//!
//! `/api/subscribe` always answers in its own vocabulary: a JSON
//! `{"status": ...}` body with HTTP 200 for `fetch` callers, or a `303` to
//! `/newsletter?status=<status>` for plain form posts.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::FormRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::feed;
use crate::index::{IndexError, IndexLoader, ResultRecord};
use crate::newsletter::{
    client_identifier, wants_json, ConvertKitClient, InMemoryRateLimitStore, Newsletter,
    RatePolicy, SubscribeForm, SubscribeOutcome, SubscribeStatus,
};
use crate::search::index_loader;
use crate::search_index::{self, IndexDocument};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    newsletter: Newsletter,
    search: Arc<IndexLoader>,
}

impl AppState {
    /// Production wiring: ConvertKit upstream, in-memory rate limiting, and
    /// the index asset at `search.index_path`.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let limiter = Arc::new(InMemoryRateLimitStore::new(RatePolicy::from_config(
            &config.newsletter,
        )));
        let api = Arc::new(ConvertKitClient::new(&config.newsletter)?);
        Ok(Self::with_newsletter(config, Newsletter::new(limiter, api)))
    }

    pub fn with_newsletter(config: &Config, newsletter: Newsletter) -> Self {
        Self {
            config: Arc::new(config.clone()),
            newsletter,
            search: Arc::new(index_loader(config)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/subscribe", post(handle_subscribe))
        .route("/rss.xml", get(handle_feed))
        .route("/api/search-index.json", get(handle_search_index))
        .route("/api/search", get(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config)?;

    // Keep the rate-limit table bounded even when traffic is too light to
    // trigger the in-band sweep.
    let limiter = state.newsletter.limiter().clone();
    let period = Duration::from_secs(config.newsletter.window_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let removed = limiter.sweep().await;
            if removed > 0 {
                tracing::debug!(removed, "swept rate-limit windows");
            }
        }
    });

    let app = build_router(state);

    println!("Site server listening on http://{}", bind_addr);
    tracing::info!(%bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        if err.is_asset_missing() {
            AppError {
                status: StatusCode::NOT_FOUND,
                code: "index_missing",
                message: "search index not built; run `site index build`".to_string(),
            }
        } else {
            tracing::error!(error = %err, "search request failed");
            internal(err.to_string())
        }
    }
}

/// Runs blocking content work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| internal(e.to_string()))?
        .map_err(|e| {
            tracing::error!(error = %e, "content build failed");
            internal(format!("{:#}", e))
        })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/subscribe ============

/// Handler for `POST /api/subscribe`.
///
/// The rate limit is counted before the body is examined, so malformed
/// submissions still use up the client's budget.
async fn handle_subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<SubscribeForm>, FormRejection>,
) -> Response {
    let client = client_identifier(&headers);
    let outcome = if !state.newsletter.admit(&client).await {
        SubscribeOutcome::status(SubscribeStatus::Error)
    } else {
        match form {
            Ok(Form(form)) => state.newsletter.subscribe(&form).await,
            Err(rejection) => {
                tracing::warn!(error = %rejection, "unreadable subscribe form");
                SubscribeOutcome::status(SubscribeStatus::Error)
            }
        }
    };
    subscribe_response(&headers, outcome)
}

fn subscribe_response(headers: &HeaderMap, outcome: SubscribeOutcome) -> Response {
    if wants_json(headers) {
        (StatusCode::OK, Json(outcome)).into_response()
    } else {
        Redirect::to(&format!("/newsletter?status={}", outcome.status.as_str())).into_response()
    }
}

// ============ GET /rss.xml ============

async fn handle_feed(State(state): State<AppState>) -> Result<Response, AppError> {
    let config = state.config.clone();
    let xml = blocking(move || feed::build_feed(&config)).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        xml,
    )
        .into_response())
}

// ============ GET /api/search-index.json ============

/// Handler for `GET /api/search-index.json`.
///
/// Builds the documents from content on every request; responses are
/// cacheable for an hour.
async fn handle_search_index(State(state): State<AppState>) -> Result<Response, AppError> {
    let config = state.config.clone();
    let docs: Vec<IndexDocument> =
        blocking(move || search_index::build_documents(&config)).await?;
    Ok((
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(docs),
    )
        .into_response())
}

// ============ GET /api/search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<ResultRecord>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let results = state
        .search
        .query(query, state.config.search.max_results)
        .await?;
    Ok(Json(SearchResponse { results }))
}
