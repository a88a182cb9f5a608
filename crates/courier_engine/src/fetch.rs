use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use courier_core::{FetchRequest, FetchResult, ReferrerRuleSet, RuleId, CONTENT_TYPE_HEADER};
use courier_logging::courier_debug;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER};
use thiserror::Error;

/// Fixed settle delay before the forced-referrer retry, giving the rule
/// change time to propagate. Best-effort mitigation, not a guarantee.
pub const RETRY_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Rules only apply to requests the relay itself issues.
const RULE_SCOPE: &str = "courier";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub retry_settle_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            retry_settle_delay: RETRY_SETTLE_DELAY,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("client construction failed: {0}")]
    Client(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("redirect limit exceeded: {0}")]
    RedirectLimit(String),
    #[error("network error: {0}")]
    Network(String),
}

/// Live `Referer`-override rules, shared between the retry path that
/// installs them and the request path that consults them.
#[derive(Debug, Clone)]
pub struct ReferrerOverride {
    rules: Arc<Mutex<ReferrerRuleSet>>,
    scope: String,
}

impl Default for ReferrerOverride {
    fn default() -> Self {
        Self::new(RULE_SCOPE)
    }
}

impl ReferrerOverride {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            rules: Arc::new(Mutex::new(ReferrerRuleSet::new())),
            scope: scope.into(),
        }
    }

    /// Installs a rule forcing `referrer` for requests to exactly `url`.
    pub fn enable(&self, url: &str, referrer: &str) -> RuleId {
        self.lock().add(url, referrer, self.scope.clone())
    }

    /// Removes a rule by id. Safe to call for ids already removed.
    pub fn disable(&self, id: RuleId) {
        self.lock().remove(id);
    }

    /// The forced `Referer` value an installed rule mandates for `url`.
    pub fn forced_referrer(&self, url: &str) -> Option<String> {
        self.lock()
            .forced_referrer(&self.scope, url)
            .map(str::to_owned)
    }

    /// Scoped acquisition: the returned guard releases the rule when
    /// dropped, regardless of how the guarded fetch terminates.
    pub fn guard(&self, url: &str, referrer: &str) -> RuleGuard {
        RuleGuard {
            rules: self.clone(),
            id: self.enable(url, referrer),
        }
    }

    pub fn active_rules(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReferrerRuleSet> {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds one installed referrer rule; dropping it releases the rule exactly once.
#[derive(Debug)]
pub struct RuleGuard {
    rules: ReferrerOverride,
    id: RuleId,
}

impl RuleGuard {
    pub fn id(&self) -> RuleId {
        self.id
    }
}

impl Drop for RuleGuard {
    fn drop(&mut self) {
        self.rules.disable(self.id);
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs a delegated fetch. Never fails: every failure is captured
    /// into the result's `error` field with an empty byte sequence.
    async fn fetch(&self, request: &FetchRequest) -> FetchResult;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    rules: ReferrerOverride,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self::with_rules(settings, ReferrerOverride::default())
    }

    pub fn with_rules(settings: FetchSettings, rules: ReferrerOverride) -> Self {
        Self { settings, rules }
    }

    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(
                self.settings.redirect_limit,
            ))
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))
    }

    async fn issue(
        &self,
        url: &reqwest::Url,
        request: &FetchRequest,
    ) -> Result<FetchResult, FetchError> {
        let client = self.build_client()?;
        let mut builder = client.get(url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        // The rule table models the session network rule: a matching rule
        // overrides whatever referrer the request itself carried.
        let referrer = self
            .rules
            .forced_referrer(url.as_str())
            .or_else(|| request.referrer.clone());
        if let Some(referrer) = referrer {
            builder = builder.header(REFERER, referrer);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            headers.insert(CONTENT_TYPE_HEADER.to_string(), content_type.to_string());
        }

        // Drain the full body before returning; delivery chunks from memory.
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk: bytes::Bytes = chunk.map_err(map_reqwest_error)?;
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchResult {
            bytes,
            headers,
            status: Some(status),
            error: None,
        })
    }

    async fn fetch_with_retry(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|err| FetchError::InvalidUrl(err.to_string()))?;

        let first = self.issue(&url, request).await?;
        let referrer = match (&request.referrer, first.status) {
            (Some(referrer), Some(401 | 403 | 404)) => referrer.clone(),
            _ => return Ok(first),
        };

        courier_debug!(
            "request {}: status {:?}, retrying with forced referrer",
            request.request_id,
            first.status
        );
        // The guard releases the rule on every exit path, including a retry
        // that errors out. The retry's result supersedes the first, whatever
        // its own status; there is no second retry.
        let _guard = self.rules.guard(url.as_str(), &referrer);
        tokio::time::sleep(self.settings.retry_settle_delay).await;
        self.issue(&url, request).await
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult {
        match self.fetch_with_retry(request).await {
            Ok(result) => result,
            Err(err) => FetchResult::failure(err.to_string()),
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout(err.to_string());
    }
    if err.is_redirect() {
        return FetchError::RedirectLimit(err.to_string());
    }
    FetchError::Network(err.to_string())
}
