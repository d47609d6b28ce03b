//! Authenticated HTTP client for one gateway account.

use crate::config::GatewayConfig;
use crate::gateway::response::{QuoteResult, RawStatus, TokenGrant};
use crate::gateway::token::TokenSlot;
use crate::gateway::{AccountIndex, GatewayError, QuoteRequest};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const AUTH_PATH: &str = "/auth/generate_token";
const QRCODES_PATH: &str = "/pix/qrcodes";

/// Longest response body quoted back in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Client-credentials pair of one account.
#[derive(Clone)]
pub struct Credentials {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Talks to the gateway on behalf of one account.
#[derive(Debug)]
pub struct AccountClient {
    index: AccountIndex,
    base_url: String,
    credentials: Credentials,
    http: reqwest::Client,
    auth_timeout: Duration,
    request_timeout: Duration,
    token: TokenSlot,
}

impl AccountClient {
    /// Create a client for `index` sharing the given HTTP connection pool.
    #[must_use]
    pub fn new(
        index: AccountIndex,
        credentials: Credentials,
        config: &GatewayConfig,
        http: reqwest::Client,
    ) -> Self {
        Self {
            index,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            http,
            auth_timeout: config.auth_timeout(),
            request_timeout: config.request_timeout(),
            token: TokenSlot::new(config.refresh_margin()),
        }
    }

    /// This client's account index.
    #[must_use]
    pub fn index(&self) -> AccountIndex {
        self.index
    }

    /// The account's token cache.
    #[must_use]
    pub fn token_slot(&self) -> &TokenSlot {
        &self.token
    }

    /// Issue a new bearer token.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Auth`] on rejected credentials, otherwise the usual
    /// HTTP classification.
    pub async fn authenticate(&self) -> Result<TokenGrant, GatewayError> {
        debug!(account = %self.index, "requesting bearer token");
        let request = self
            .http
            .post(format!("{}{AUTH_PATH}", self.base_url))
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .timeout(self.auth_timeout);

        let body = self.send(request).await.map_err(|e| match e {
            GatewayError::Validation { status: 400, message } => GatewayError::Auth(message),
            other => other,
        })?;
        TokenGrant::from_value(&body)
    }

    /// Issue a QR code.
    ///
    /// # Errors
    ///
    /// Returns the classified gateway failure.
    pub async fn create_quote(&self, request: &QuoteRequest) -> Result<QuoteResult, GatewayError> {
        let token = self.bearer().await?;
        let builder = self
            .http
            .post(format!("{}{QRCODES_PATH}", self.base_url))
            .bearer_auth(token)
            .json(request)
            .timeout(self.request_timeout);

        let body = self.send_authorized(builder).await?;
        QuoteResult::from_value(&body)
    }

    /// Pull the status of a QR code.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotFound`] if this account does not know the
    /// reference code, otherwise the classified gateway failure.
    pub async fn get_status(&self, reference_code: &str) -> Result<RawStatus, GatewayError> {
        let url = self.status_url(reference_code)?;
        let token = self.bearer().await?;
        let builder = self
            .http
            .get(url)
            .bearer_auth(token)
            .timeout(self.request_timeout);

        let body = self.send_authorized(builder).await?;
        RawStatus::from_value(&body)
    }

    /// Status URL with `reference_code` encoded as a single path segment.
    fn status_url(&self, reference_code: &str) -> Result<Url, GatewayError> {
        let base = format!("{}{QRCODES_PATH}", self.base_url);
        let mut url = Url::parse(&base)
            .map_err(|e| GatewayError::Configuration(format!("invalid base url {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| GatewayError::Configuration(format!("base url {base} cannot take a path")))?
            .push(reference_code);
        Ok(url)
    }

    async fn bearer(&self) -> Result<String, GatewayError> {
        self.token.get_or_refresh(|| self.authenticate()).await
    }

    /// Send a bearer-authenticated request; a 401 drops the cached token so
    /// the next call re-authenticates.
    async fn send_authorized(&self, builder: RequestBuilder) -> Result<Value, GatewayError> {
        let result = self.send(builder).await;
        if matches!(result, Err(GatewayError::Auth(_))) {
            warn!(account = %self.index, "bearer token rejected, invalidating");
            self.token.invalidate().await;
        }
        result
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, GatewayError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Transient(format!("account {} timed out", self.index))
            } else {
                GatewayError::Transient(format!("account {}: {e}", self.index))
            }
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transient(format!("account {}: {e}", self.index)))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            let message: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(classify(status, message));
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            GatewayError::UnrecognizedShape(format!("account {}: invalid JSON: {e}", self.index))
        })
    }
}

/// Map a non-success HTTP status to the gateway error taxonomy.
fn classify(status: StatusCode, message: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Auth(message),
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            GatewayError::Transient(format!("{status}: {message}"))
        }
        s if s.is_server_error() => GatewayError::Transient(format!("{status}: {message}")),
        s => GatewayError::Validation {
            status: s.as_u16(),
            message,
        },
    }
}
