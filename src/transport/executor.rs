//! Admission-controlled request execution with retries.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use tracing::Instrument;
use url::Url;

use super::outcome::{AttemptOutcome, RequestPhase};
use super::request::{ApiRequest, ApiResponse, RequestBody, CLIENT_REQUEST_ID_HEADER};
use crate::auth::{AuthHeaders, CredentialsProvider};
use crate::cancel::CancelSignal;
use crate::config::RetryConfig;
use crate::ratelimit::RateLimiter;
use crate::{user_agent, Error};

/// `api-version` appended to every call unless overridden.
pub const DEFAULT_API_VERSION: &str = "7.1";

/// Per-attempt timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const API_VERSION_PARAM: &str = "api-version";

/// Executes API calls with authentication, admission control, per-attempt
/// timeouts and retries.
///
/// Each call:
///
/// 1. resolves the endpoint against the base URL and appends `api-version`
/// 2. merges headers, caller over credential over default
/// 3. waits for [`RateLimiter`] admission once
/// 4. makes up to `max_retries + 1` attempts
///
/// Timeouts, connection failures, 5xx and 429 responses are retried with
/// exponential backoff; a 429 waits at least as long as its `Retry-After` and
/// pauses the shared limiter. Every other status of 400 or above fails on first
/// occurrence. A 401 also drops the provider's cached token.
///
/// The configured `api-version` is a default, not a forced value. A
/// per-request override or a caller-supplied `api-version` parameter replaces
/// it; see [`resolve_url`](Self::resolve_url).
///
/// ## Worst-case duration
///
/// The timeout applies to each attempt separately, so one call can take up to
/// `(max_retries + 1) * timeout` plus the sum of backoff delays, plus any rate
/// limiter wait.
///
/// ## Example
///
/// ```rust,no_run
/// use azure_devops_core::{
///     ApiRequest, CredentialConfig, CredentialProvider, RateLimitPolicy, RateLimiter,
///     RequestExecutor,
/// };
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), azure_devops_core::Error> {
/// let credentials = Arc::new(CredentialProvider::new(
///     CredentialConfig::personal_access_token("contoso", "pat")?,
/// )?);
/// let executor = RequestExecutor::builder()
///     .base_url("https://dev.azure.com/contoso/_apis")
///     .credentials(credentials)
///     .rate_limiter(Arc::new(RateLimiter::new(RateLimitPolicy::default())?))
///     .build()?;
///
/// let response = executor.execute(ApiRequest::get("projects")).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
pub struct RequestExecutor {
    http: reqwest::Client,
    base_url: Url,
    api_version: String,
    timeout: Duration,
    retry: RetryConfig,
    credentials: Arc<dyn CredentialsProvider>,
    limiter: Arc<RateLimiter>,
    user_agent: String,
}

#[bon::bon]
impl RequestExecutor {
    /// Creates an executor.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for an unparseable or non-HTTP base URL,
    /// a zero timeout or an invalid retry configuration.
    #[builder]
    pub fn new(
        #[builder(into)] base_url: String,
        credentials: Arc<dyn CredentialsProvider>,
        rate_limiter: Arc<RateLimiter>,
        #[builder(into, default = DEFAULT_API_VERSION.to_string())] api_version: String,
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
        #[builder(default)] retry: RetryConfig,
        #[builder(into)] application: Option<String>,
        http_client: Option<reqwest::Client>,
    ) -> Result<Self, Error> {
        retry.validate()?;
        if timeout.is_zero() {
            return Err(Error::configuration("timeout must be greater than zero"));
        }
        if api_version.trim().is_empty() {
            return Err(Error::configuration("api_version cannot be empty"));
        }

        let base_url = normalize_base_url(&base_url)?;

        let http = match http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| {
                    Error::configuration(format!("failed to create HTTP client: {}", e))
                        .with_source(e)
                })?,
        };

        let user_agent = match application {
            Some(app) => user_agent::user_agent_for(&app),
            None => user_agent::user_agent().to_string(),
        };

        Ok(Self {
            http,
            base_url,
            api_version,
            timeout,
            retry,
            credentials,
            limiter: rate_limiter,
            user_agent,
        })
    }
}

impl RequestExecutor {
    /// Returns the base URL. Always ends with `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the default `api-version`.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Returns the per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the retry configuration.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the shared rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Returns the credentials provider.
    pub fn credentials(&self) -> &Arc<dyn CredentialsProvider> {
        &self.credentials
    }

    /// Returns the current authentication headers, for callers that need to
    /// reach a different host with the same identity.
    pub async fn auth_headers(&self) -> Result<AuthHeaders, Error> {
        self.credentials.auth_headers().await
    }

    /// Builds the absolute URL for `request`, including `api-version`.
    ///
    /// The per-request override wins, then an `api-version` query parameter
    /// supplied by the caller, then one already present in an absolute
    /// endpoint, then the executor default.
    pub fn resolve_url(&self, request: &ApiRequest) -> Result<Url, Error> {
        let endpoint = request.endpoint();
        let mut url = if is_absolute(endpoint) {
            Url::parse(endpoint)?
        } else {
            self.base_url.join(endpoint.trim_start_matches('/'))?
        };

        let mut existing_version = None;
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (k, v) in url.query_pairs() {
            if k == API_VERSION_PARAM {
                existing_version = Some(v.into_owned());
            } else {
                pairs.push((k.into_owned(), v.into_owned()));
            }
        }

        let mut caller_version = None;
        for (k, v) in request.query_params() {
            if k == API_VERSION_PARAM {
                caller_version = Some(v.clone());
            } else {
                pairs.push((k.clone(), v.clone()));
            }
        }

        let version = request
            .api_version_override()
            .map(str::to_owned)
            .or(caller_version)
            .or(existing_version)
            .unwrap_or_else(|| self.api_version.clone());

        url.set_query(None);
        url.query_pairs_mut()
            .extend_pairs(pairs)
            .append_pair(API_VERSION_PARAM, &version);
        Ok(url)
    }

    /// Executes one logical call.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the first terminal failure, or of the
    /// last attempt once retries are exhausted.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        self.execute_with_cancel(request, &CancelSignal::never())
            .await
    }

    /// Like [`execute`](Self::execute), returning `Cancelled` as soon as
    /// `cancel` fires at any suspension point.
    pub async fn execute_with_cancel(
        &self,
        request: ApiRequest,
        cancel: &CancelSignal,
    ) -> Result<ApiResponse, Error> {
        let client_request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::debug_span!(
            "execute",
            method = %request.method(),
            endpoint = request.endpoint(),
            client_request_id = %client_request_id,
        );

        async {
            let result = self.run(&request, &client_request_id, cancel).await;
            if let Err(ref err) = result {
                tracing::debug!(
                    phase = %RequestPhase::Failed(err.kind()),
                    error = %err,
                    "call failed"
                );
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &ApiRequest,
        client_request_id: &str,
        cancel: &CancelSignal,
    ) -> Result<ApiResponse, Error> {
        tracing::trace!(phase = %RequestPhase::Init);
        let url = self.resolve_url(request)?;
        let body = request.request_body().encode()?;

        tracing::trace!(phase = %RequestPhase::Authenticating);
        let auth = cancel.guard(self.credentials.auth_headers()).await??;
        let headers = self.merge_headers(request, auth, client_request_id)?;

        tracing::trace!(phase = %RequestPhase::RateLimitWaiting);
        self.limiter
            .acquire_with_cancel(request.method().as_str(), request.endpoint(), cancel)
            .await?;

        let max_attempts = self.retry.max_attempts();
        let mut attempt: u32 = 0;
        loop {
            tracing::debug!(
                phase = %RequestPhase::Sending,
                attempt = attempt + 1,
                max_attempts,
                url = %url,
                "sending request"
            );

            let outcome = cancel
                .guard(self.send_once(request, &url, &headers, body.clone()))
                .await?;

            match outcome {
                AttemptOutcome::Success(response) => {
                    tracing::debug!(
                        phase = %RequestPhase::Success,
                        status = response.status(),
                        request_id = response.request_id(),
                        "request succeeded"
                    );
                    return Ok(response);
                }
                AttemptOutcome::Terminal(err) => {
                    if err.status() == Some(401) {
                        self.credentials.invalidate();
                    }
                    return Err(err);
                }
                AttemptOutcome::Retryable {
                    error,
                    server_retry_after,
                } => {
                    if let Some(hint) = server_retry_after {
                        self.limiter.handle_server_rate_limit(hint);
                    }

                    attempt += 1;
                    if attempt >= max_attempts {
                        tracing::warn!(
                            attempts = attempt,
                            error = %error,
                            "retries exhausted"
                        );
                        return Err(error);
                    }

                    let backoff = self.retry.delay_for_attempt(attempt - 1);
                    let delay = server_retry_after.map_or(backoff, |hint| hint.max(backoff));
                    tracing::warn!(
                        phase = %RequestPhase::RetryWait,
                        attempt,
                        kind = %error.kind(),
                        status = error.status(),
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    cancel.sleep(delay).await?;
                }
            }
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        url: &Url,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> AttemptOutcome {
        let mut builder = self
            .http
            .request(request.method().clone(), url.clone())
            .headers(headers.clone())
            .timeout(self.timeout);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::from_transport_error(e),
        };

        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        match response.bytes().await {
            Ok(bytes) => AttemptOutcome::from_response(status, response_headers, bytes),
            Err(e) => AttemptOutcome::from_transport_error(e),
        }
    }

    fn merge_headers(
        &self,
        request: &ApiRequest,
        auth: AuthHeaders,
        client_request_id: &str,
    ) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(
            HeaderName::from_static(CLIENT_REQUEST_ID_HEADER),
            header_value(client_request_id)?,
        );
        if matches!(request.request_body(), RequestBody::Json(_)) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        for (name, value) in &auth {
            let value = header_value(value).map_err(|_| {
                Error::authentication(format!(
                    "credential header {} is not a valid header value",
                    name
                ))
            })?;
            headers.insert(header_name(name)?, value);
        }

        for (name, value) in request.headers() {
            headers.insert(header_name(name)?, header_value(value)?);
        }

        Ok(headers)
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url.as_str())
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn is_absolute(endpoint: &str) -> bool {
    let lower = endpoint.get(..8).unwrap_or(endpoint).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw.trim())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::configuration(format!(
            "base URL must use http or https, got {}",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn header_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::validation(format!("invalid header name: {}", name)))
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::validation("invalid header value"))
}
