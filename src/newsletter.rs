//! Newsletter subscription proxy.
//!
//! `POST /api/subscribe` accepts a form submission, screens it (rate limit,
//! email shape, honeypot field), and forwards it to the ConvertKit v3 API.
//! The client only ever sees one of three statuses (`success`, `already`,
//! `error`) plus, for configuration and upstream failures, a numeric code
//! and a fixed message. Upstream response bodies are logged, never echoed.
//!
//! # Rate limiting
//!
//! Requests are counted per client identifier in fixed windows: the first
//! request opens a window of `window_secs`; once more than `max_hits`
//! requests land inside it, further requests are refused until it expires.
//! Counting goes through the [`RateLimitStore`] trait so deployments can
//! share state; [`InMemoryRateLimitStore`] is the single-process default.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::NewsletterConfig;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static NUMERIC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

const UPSTREAM_FAILED: &str = "Request to the newsletter provider failed";
const MISSING_CREDENTIALS: &str =
    "Missing ConvertKit settings (form_id or tag_id, and api_secret or api_key).";

// ─── Outcomes and errors ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeStatus {
    Success,
    Already,
    Error,
}

impl SubscribeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscribeStatus::Success => "success",
            SubscribeStatus::Already => "already",
            SubscribeStatus::Error => "error",
        }
    }
}

/// What the client is told.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeOutcome {
    pub status: SubscribeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubscribeOutcome {
    pub fn status(status: SubscribeStatus) -> Self {
        Self {
            status,
            code: None,
            error: None,
        }
    }

    pub fn failure(code: u16, error: impl Into<String>) -> Self {
        Self {
            status: SubscribeStatus::Error,
            code: Some(code),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("{0}")]
    Config(String),
    #[error("newsletter provider returned HTTP {status}")]
    Upstream { status: u16 },
    #[error("request to newsletter provider failed: {0}")]
    Transport(String),
}

impl SubscribeError {
    /// Client-safe rendering of the error.
    pub fn to_outcome(&self) -> SubscribeOutcome {
        match self {
            SubscribeError::Config(message) => SubscribeOutcome::failure(500, message.clone()),
            SubscribeError::Upstream { status } => {
                SubscribeOutcome::failure(*status, UPSTREAM_FAILED)
            }
            SubscribeError::Transport(_) => SubscribeOutcome::failure(502, UPSTREAM_FAILED),
        }
    }
}

// ─── Rate limiting ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub window: Duration,
    pub max_hits: u32,
}

impl RatePolicy {
    pub fn from_config(config: &NewsletterConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            max_hits: config.max_hits,
        }
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_hits: 5,
        }
    }
}

/// Per-client request counting.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one request from `key` and decides whether it may proceed.
    async fn check(&self, key: &str) -> RateDecision;

    /// Drops expired windows. Returns how many were removed.
    async fn sweep(&self) -> usize;
}

struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter in process memory.
///
/// Expired windows are evicted by [`sweep`](RateLimitStore::sweep), which
/// also runs automatically every `sweep_every` checks.
pub struct InMemoryRateLimitStore {
    policy: RatePolicy,
    sweep_every: u64,
    windows: Mutex<HashMap<String, Window>>,
    checks: AtomicU64,
}

impl InMemoryRateLimitStore {
    pub const DEFAULT_SWEEP_EVERY: u64 = 256;

    pub fn new(policy: RatePolicy) -> Self {
        Self::with_sweep_every(policy, Self::DEFAULT_SWEEP_EVERY)
    }

    pub fn with_sweep_every(policy: RatePolicy, sweep_every: u64) -> Self {
        Self {
            policy,
            sweep_every: sweep_every.max(1),
            windows: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    /// Number of tracked clients, expired or not.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn evict_expired(windows: &mut HashMap<String, Window>, now: Instant) -> usize {
        let before = windows.len();
        windows.retain(|_, w| now <= w.reset_at);
        before - windows.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        let mut windows = self.lock();

        if checks % self.sweep_every == 0 {
            let removed = Self::evict_expired(&mut windows, now);
            if removed > 0 {
                tracing::debug!(removed, "evicted expired rate-limit windows");
            }
        }

        match windows.get_mut(key) {
            Some(window) if now <= window.reset_at => {
                window.count += 1;
                if window.count > self.policy.max_hits {
                    RateDecision::Limited
                } else {
                    RateDecision::Allowed
                }
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        reset_at: now + self.policy.window,
                    },
                );
                RateDecision::Allowed
            }
        }
    }

    async fn sweep(&self) -> usize {
        Self::evict_expired(&mut self.lock(), Instant::now())
    }
}

// ─── Upstream API ───────────────────────────────────────────────────

/// A screened subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub email: String,
    pub first_name: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscribed {
    New,
    Already,
}

#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    async fn subscribe(&self, subscription: &Subscription) -> Result<Subscribed, SubscribeError>;
}

pub struct ConvertKitClient {
    http: reqwest::Client,
    config: NewsletterConfig,
}

impl ConvertKitClient {
    pub fn new(config: &NewsletterConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Subscribe URL and credential field, or the configuration problem
    /// that prevents building them.
    pub fn endpoint(&self) -> Result<(String, (&'static str, &str)), SubscribeError> {
        let form_id = present(&self.config.form_id);
        let tag_id = present(&self.config.tag_id);
        let credential = match (present(&self.config.api_secret), present(&self.config.api_key)) {
            (Some(secret), _) => Some(("api_secret", secret)),
            (None, Some(key)) => Some(("api_key", key)),
            (None, None) => None,
        };

        let (Some(credential), true) = (credential, form_id.is_some() || tag_id.is_some())
        else {
            return Err(SubscribeError::Config(MISSING_CREDENTIALS.to_string()));
        };
        if let Some(id) = form_id.filter(|id| !NUMERIC_ID.is_match(id)) {
            return Err(SubscribeError::Config(format!(
                "Form ID must be numeric (found: {}). Check data-sv-form in your Kit embed.",
                id
            )));
        }
        if let Some(id) = tag_id.filter(|id| !NUMERIC_ID.is_match(id)) {
            return Err(SubscribeError::Config(format!(
                "Tag ID must be numeric (found: {}).",
                id
            )));
        }

        let base = self.config.api_base.trim_end_matches('/');
        let url = match form_id {
            Some(form) => format!("{}/forms/{}/subscribe", base, form),
            None => format!("{}/tags/{}/subscribe", base, tag_id.unwrap_or_default()),
        };
        Ok((url, credential))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[async_trait]
impl SubscriptionApi for ConvertKitClient {
    async fn subscribe(&self, subscription: &Subscription) -> Result<Subscribed, SubscribeError> {
        let (url, (credential_field, credential)) = self.endpoint()?;

        let mut body = serde_json::json!({
            credential_field: credential,
            "email": subscription.email,
        });
        if let Some(name) = &subscription.first_name {
            body["first_name"] = serde_json::json!(name);
        }
        if let Some(source) = &subscription.source {
            body["fields"] = serde_json::json!({ "source": source });
        }

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SubscribeError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(Subscribed::New);
        }
        if status.as_u16() == 422 {
            return Ok(Subscribed::Already);
        }

        let body_text = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            body = %body_text.chars().take(500).collect::<String>(),
            "ConvertKit subscribe error"
        );
        Err(SubscribeError::Upstream {
            status: status.as_u16(),
        })
    }
}

// ─── Request screening ──────────────────────────────────────────────

/// Form fields of `POST /api/subscribe`. `website` is the honeypot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscribeForm {
    pub email: String,
    pub name: String,
    pub website: String,
    pub source: String,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// First `X-Forwarded-For` entry, else `X-Real-IP`, else `"unknown"`.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    header("x-real-ip").unwrap_or("unknown").to_string()
}

/// JSON is returned to `fetch` callers; plain form posts get a redirect.
pub fn wants_json(headers: &HeaderMap) -> bool {
    let accepts_json = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"));
    let fetch = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "fetch");
    accepts_json || fetch
}

/// Rate limiting, screening, and the upstream call, wired together.
#[derive(Clone)]
pub struct Newsletter {
    limiter: Arc<dyn RateLimitStore>,
    api: Arc<dyn SubscriptionApi>,
}

impl Newsletter {
    pub fn new(limiter: Arc<dyn RateLimitStore>, api: Arc<dyn SubscriptionApi>) -> Self {
        Self { limiter, api }
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimitStore> {
        &self.limiter
    }

    /// Counts the request against `client`. Runs before the body is read.
    pub async fn admit(&self, client: &str) -> bool {
        match self.limiter.check(client).await {
            RateDecision::Allowed => true,
            RateDecision::Limited => {
                tracing::warn!(client, "newsletter rate limit hit");
                false
            }
        }
    }

    /// Screens the form and forwards it upstream.
    pub async fn subscribe(&self, form: &SubscribeForm) -> SubscribeOutcome {
        let email = form.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return SubscribeOutcome::status(SubscribeStatus::Error);
        }
        if !form.website.trim().is_empty() {
            tracing::info!("newsletter honeypot triggered");
            return SubscribeOutcome::status(SubscribeStatus::Error);
        }

        let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        let subscription = Subscription {
            email,
            first_name: non_empty(&form.name),
            source: non_empty(&form.source),
        };

        match self.api.subscribe(&subscription).await {
            Ok(Subscribed::New) => SubscribeOutcome::status(SubscribeStatus::Success),
            Ok(Subscribed::Already) => SubscribeOutcome::status(SubscribeStatus::Already),
            Err(e) => {
                tracing::error!(error = %e, "newsletter subscribe failed");
                e.to_outcome()
            }
        }
    }
}
