//! HTTP API client with bearer-token attachment and response-recovery policy.
//!
//! Every authenticated call goes through [`ApiClient::execute`], which applies
//! the recovery rules in order (first match wins):
//!
//! 1. network error, not yet retried: wait a fixed backoff and resend once
//! 2. 401: evict the session and fail with [`ApiError::SessionExpired`]
//! 3. 429: wait `Retry-After` seconds (default 5) and resend, up to a cap
//! 4. 5xx: fail with a generic server error
//! 5. 422: fail with all field-level validation errors concatenated
//! 6. anything else: fail with the response passed through

use std::time::Duration;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;

use lancelink_shared::{
    try_problem_detail, AuthResponse, ChatMessage, LoginRequest, Notification,
    SendMessageRequest, UserIdentity,
};

use crate::config::{ClientConfig, RetryConfig};
use crate::error::ApiError;
use crate::session::SessionStore;

/// What to do with a completed (non-network-error) response.
#[derive(Debug, PartialEq)]
pub(crate) enum Recovery {
    Done,
    RetryAfter(Duration),
    Fail(ApiError),
}

/// Pure response classifier. Rules are evaluated in precedence order and
/// exactly one fires.
pub(crate) fn classify_response(
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
    rate_limit_attempt: u32,
    retry: &RetryConfig,
) -> Recovery {
    if (200..300).contains(&status) {
        return Recovery::Done;
    }
    if status == 401 {
        return Recovery::Fail(ApiError::SessionExpired);
    }
    if status == 429 {
        // The upstream behavior retried without limit on server cooperation;
        // here the budget is capped and the caller sees RateLimited once
        // it runs out.
        if rate_limit_attempt + 1 >= retry.rate_limit_max_attempts {
            return Recovery::Fail(ApiError::RateLimited);
        }
        let delay = retry_after_secs
            .map(Duration::from_secs)
            .unwrap_or(retry.rate_limit_default_delay);
        return Recovery::RetryAfter(delay);
    }
    if status >= 500 {
        return Recovery::Fail(ApiError::Server);
    }
    if status == 422 {
        let message =
            try_problem_detail(body).unwrap_or_else(|| "validation failed".to_string());
        return Recovery::Fail(ApiError::Validation(message));
    }
    match status {
        403 => Recovery::Fail(ApiError::Forbidden),
        404 => Recovery::Fail(ApiError::NotFound),
        _ => Recovery::Fail(ApiError::Http {
            status,
            body: body.to_string(),
        }),
    }
}

/// HTTP client for the lancelink REST API.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: SessionStore) -> Self {
        Self {
            http: Client::new(),
            config,
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request and drive it through the recovery policy, returning
    /// the raw response body on success.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<String, ApiError> {
        let url = self.config.api_url(path);
        let mut retried_network = false;
        let mut rate_limit_attempt = 0u32;

        loop {
            let mut rb = self.http.request(method.clone(), &url);
            if let Some(token) = self.session.token() {
                rb = rb.bearer_auth(token);
            }
            if let Some(bytes) = &body {
                rb = rb
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(bytes.clone());
            }

            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if !retried_network {
                        retried_network = true;
                        tracing::debug!("network error on {method} {url}, retrying once: {err}");
                        tokio::time::sleep(self.config.retry.network_retry_delay).await;
                        continue;
                    }
                    return Err(ApiError::Network(err.to_string()));
                }
            };

            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            let text = resp
                .text()
                .await
                .map_err(|err| ApiError::Network(format!("failed to read body: {err}")))?;

            match classify_response(
                status,
                retry_after,
                &text,
                rate_limit_attempt,
                &self.config.retry,
            ) {
                Recovery::Done => return Ok(text),
                Recovery::RetryAfter(delay) => {
                    rate_limit_attempt += 1;
                    tracing::debug!(
                        "rate limited on {url}, waiting {delay:?} (attempt {rate_limit_attempt})"
                    );
                    tokio::time::sleep(delay).await;
                }
                Recovery::Fail(ApiError::SessionExpired) => {
                    self.session.expire(path);
                    return Err(ApiError::SessionExpired);
                }
                Recovery::Fail(err) => return Err(err),
            }
        }
    }

    fn parse<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
        let result = if text.is_empty() {
            serde_json::from_str("null")
        } else {
            serde_json::from_str(text)
        };
        result.map_err(|err| ApiError::Deserialize(err.to_string()))
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.execute(Method::GET, path, None).await?;
        Self::parse(&text)
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let bytes =
            serde_json::to_vec(body).map_err(|err| ApiError::Deserialize(err.to_string()))?;
        let text = self.execute(Method::POST, path, Some(bytes)).await?;
        Self::parse(&text)
    }

    /// Make a PUT request with JSON body
    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let bytes =
            serde_json::to_vec(body).map_err(|err| ApiError::Deserialize(err.to_string()))?;
        let text = self.execute(Method::PUT, path, Some(bytes)).await?;
        Self::parse(&text)
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(Method::DELETE, path, None).await?;
        Ok(())
    }

    // --- Identity ---

    /// Fetch the current identity (`GET /auth/me`).
    pub async fn me(&self) -> Result<UserIdentity, ApiError> {
        self.get_json("/auth/me").await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.post_json(
            "/auth/login",
            &LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    pub async fn admin_login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.post_json(
            "/auth/admin/login",
            &LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    /// Login and persist the resulting session in one step.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity, ApiError> {
        let auth = self.login(email, password).await?;
        self.session.login(auth.token, auth.user.clone());
        Ok(auth.user)
    }

    /// Invalidate the session server-side (`POST /auth/logout`). Local
    /// eviction is [`SessionStore::logout`]'s job.
    pub async fn logout_remote(&self) -> Result<(), ApiError> {
        self.execute(Method::POST, "/auth/logout", Some(b"{}".to_vec()))
            .await?;
        Ok(())
    }

    // --- Messaging ---

    /// Fetch the full message history with one peer.
    pub async fn conversation(&self, peer_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        self.get_json(&format!("/messages/{peer_id}")).await
    }

    /// Persist a new message to a peer; returns the server's copy.
    pub async fn send_chat_message(
        &self,
        peer_id: &str,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        self.post_json(
            &format!("/messages/{peer_id}"),
            &SendMessageRequest {
                content: content.to_string(),
            },
        )
        .await
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/messages/{message_id}")).await
    }

    // --- Notifications ---

    pub async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.get_json("/notifications").await
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<(), ApiError> {
        self.execute(
            Method::PUT,
            &format!("/notifications/{notification_id}/read"),
            Some(b"{}".to_vec()),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry() -> RetryConfig {
        RetryConfig::default()
    }

    #[test]
    fn success_statuses_pass_through() {
        assert_eq!(classify_response(200, None, "", 0, &retry()), Recovery::Done);
        assert_eq!(classify_response(204, None, "", 0, &retry()), Recovery::Done);
    }

    #[test]
    fn unauthorized_expires_the_session() {
        assert_eq!(
            classify_response(401, None, "", 0, &retry()),
            Recovery::Fail(ApiError::SessionExpired)
        );
    }

    #[test]
    fn rate_limit_honors_retry_after_and_default() {
        assert_eq!(
            classify_response(429, Some(3), "", 0, &retry()),
            Recovery::RetryAfter(Duration::from_secs(3))
        );
        assert_eq!(
            classify_response(429, None, "", 0, &retry()),
            Recovery::RetryAfter(Duration::from_secs(5))
        );
    }

    #[test]
    fn rate_limit_budget_is_capped() {
        let retry = retry();
        let last_allowed = retry.rate_limit_max_attempts - 2;
        assert!(matches!(
            classify_response(429, Some(1), "", last_allowed, &retry),
            Recovery::RetryAfter(_)
        ));
        assert_eq!(
            classify_response(429, Some(1), "", last_allowed + 1, &retry),
            Recovery::Fail(ApiError::RateLimited)
        );
    }

    #[test]
    fn server_errors_are_generic_and_never_retried() {
        assert_eq!(
            classify_response(500, None, "boom", 0, &retry()),
            Recovery::Fail(ApiError::Server)
        );
        assert_eq!(
            classify_response(503, Some(10), "", 0, &retry()),
            Recovery::Fail(ApiError::Server)
        );
    }

    #[test]
    fn validation_errors_are_flattened() {
        let body = r#"{
            "type": "https://lancelink.dev/problems/validation",
            "title": "Unprocessable Entity",
            "status": 422,
            "errors": {
                "email": ["is required"],
                "rate": ["must be positive"]
            }
        }"#;
        assert_eq!(
            classify_response(422, None, body, 0, &retry()),
            Recovery::Fail(ApiError::Validation(
                "email: is required; rate: must be positive".to_string()
            ))
        );
    }

    #[test]
    fn known_client_errors_map_to_their_kind() {
        assert_eq!(
            classify_response(403, None, "", 0, &retry()),
            Recovery::Fail(ApiError::Forbidden)
        );
        assert_eq!(
            classify_response(404, None, "", 0, &retry()),
            Recovery::Fail(ApiError::NotFound)
        );
    }

    #[test]
    fn unknown_statuses_pass_the_body_through() {
        assert_eq!(
            classify_response(409, None, "conflict", 0, &retry()),
            Recovery::Fail(ApiError::Http {
                status: 409,
                body: "conflict".to_string()
            })
        );
    }
}
