//! API client for communicating with the fittrack REST API.
//!
//! This module provides the `ApiClient` struct, the single gateway every
//! outbound request goes through.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::models::{
    FitnessGoal, GoalPatch, HealthMetric, LoginRequest, LoginResponse, Meal, MealPatch,
    MetricPatch, NewGoal, NewMeal, NewMetric, RegisterRequest, RegisterResponse, UserProfile,
};

use super::{ApiError, ApiResult};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Scheme prefix of the Authorization header.
const TOKEN_SCHEME: &str = "Token";

const METRICS: &str = "metrics";
const MEALS: &str = "meals";
const GOALS: &str = "goals";

/// API client for fittrack.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling,
/// and the token store is shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client for `base_url`, reading the session token
    /// from `store` on every request.
    pub fn new(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, base_url, store))
    }

    /// Build a client around an existing `reqwest::Client`, sharing its pool.
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            store,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the first rate-limit backoff delay (it doubles per retry).
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Headers for one request. `explicit` wins over the stored token.
    fn auth_headers(&self, explicit: Option<&str>) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let token = match explicit {
            Some(token) => Some(token.to_string()),
            None => self.store.get(),
        };
        if let Some(token) = token {
            match header::HeaderValue::from_str(&format!("{} {}", TOKEN_SCHEME, token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(_) => warn!("Stored token is not a valid header value, sending unauthenticated"),
            }
        }
        headers
    }

    /// Send a request, retrying on 429, and map any non-success status
    /// into an `ApiError`.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        explicit_token: Option<&str>,
    ) -> ApiResult<Response> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .headers(self.auth_headers(explicit_token));
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            debug!(method = %method, path = path, status = status.as_u16(), "API response");

            if status.is_success() {
                return Ok(response);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(path = path, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                // Reported, not acted on: the session decides whether to end.
                warn!(method = %method, path = path, "Unauthorized response (401)");
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        explicit_token: Option<&str>,
    ) -> ApiResult<T> {
        let response = self.send(method, path, body, explicit_token).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send_json(Method::GET, path, None::<&()>, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<T> {
        self.send_json(Method::POST, path, Some(body), None).await
    }

    async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<T> {
        self.send_json(Method::PATCH, path, Some(body), None).await
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        self.send(Method::DELETE, path, None::<&()>, None).await?;
        Ok(())
    }

    fn collection_path(collection: &str) -> String {
        format!("/{}/", collection)
    }

    fn item_path(collection: &str, id: i64) -> String {
        format!("/{}/{}/", collection, id)
    }

    // ===== Authentication =====

    /// Exchange username and password for a token.
    pub async fn login(&self, credentials: &LoginRequest) -> ApiResult<LoginResponse> {
        self.post("/login/", credentials).await
    }

    /// Create an account. The request type has no confirmation field, so
    /// one can never be transmitted.
    pub async fn register(&self, payload: &RegisterRequest) -> ApiResult<RegisterResponse> {
        self.post("/register/", payload).await
    }

    /// Fetch the profile of whoever owns the stored token.
    pub async fn current_user(&self) -> ApiResult<UserProfile> {
        self.get("/user/").await
    }

    /// Fetch the profile for a specific token, regardless of what is stored.
    pub async fn current_user_with_token(&self, token: &str) -> ApiResult<UserProfile> {
        self.send_json(Method::GET, "/user/", None::<&()>, Some(token)).await
    }

    // ===== Health metrics =====

    pub async fn list_metrics(&self) -> ApiResult<Vec<HealthMetric>> {
        self.get(&Self::collection_path(METRICS)).await
    }

    pub async fn get_metric(&self, id: i64) -> ApiResult<HealthMetric> {
        self.get(&Self::item_path(METRICS, id)).await
    }

    pub async fn create_metric(&self, metric: &NewMetric) -> ApiResult<HealthMetric> {
        self.post(&Self::collection_path(METRICS), metric).await
    }

    pub async fn update_metric(&self, id: i64, patch: &MetricPatch) -> ApiResult<HealthMetric> {
        self.patch(&Self::item_path(METRICS, id), patch).await
    }

    pub async fn delete_metric(&self, id: i64) -> ApiResult<()> {
        self.delete(&Self::item_path(METRICS, id)).await
    }

    // ===== Meals =====

    pub async fn list_meals(&self) -> ApiResult<Vec<Meal>> {
        self.get(&Self::collection_path(MEALS)).await
    }

    pub async fn get_meal(&self, id: i64) -> ApiResult<Meal> {
        self.get(&Self::item_path(MEALS, id)).await
    }

    pub async fn create_meal(&self, meal: &NewMeal) -> ApiResult<Meal> {
        self.post(&Self::collection_path(MEALS), meal).await
    }

    pub async fn update_meal(&self, id: i64, patch: &MealPatch) -> ApiResult<Meal> {
        self.patch(&Self::item_path(MEALS, id), patch).await
    }

    pub async fn delete_meal(&self, id: i64) -> ApiResult<()> {
        self.delete(&Self::item_path(MEALS, id)).await
    }

    // ===== Goals =====

    pub async fn list_goals(&self) -> ApiResult<Vec<FitnessGoal>> {
        self.get(&Self::collection_path(GOALS)).await
    }

    pub async fn get_goal(&self, id: i64) -> ApiResult<FitnessGoal> {
        self.get(&Self::item_path(GOALS, id)).await
    }

    pub async fn create_goal(&self, goal: &NewGoal) -> ApiResult<FitnessGoal> {
        self.post(&Self::collection_path(GOALS), goal).await
    }

    pub async fn update_goal(&self, id: i64, patch: &GoalPatch) -> ApiResult<FitnessGoal> {
        self.patch(&Self::item_path(GOALS, id), patch).await
    }

    pub async fn delete_goal(&self, id: i64) -> ApiResult<()> {
        self.delete(&Self::item_path(GOALS, id)).await
    }
}
