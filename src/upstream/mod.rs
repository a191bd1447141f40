//! Upstream weather provider client.
//!
//! One best-effort GET per call against the Visual Crossing timeline API. No
//! retries; failures come back as [`UpstreamError`] values so the caller decides
//! what reaches the client and what gets cached.

use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

/// Default provider origin.
pub const VISUAL_CROSSING_BASE_URL: &str = "https://weather.visualcrossing.com";

const TIMELINE_PATH: [&str; 4] = ["VisualCrossingWebServices", "rest", "services", "timeline"];

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body quoted back in [`UpstreamError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// Failures talking to the weather provider.
///
/// Messages never include the request URL, which carries the API key.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("weather provider request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("weather provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("weather provider returned invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid weather provider base URL: {0}")]
    BaseUrl(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.without_url())
    }
}

/// Boxed future returned by [`WeatherProvider::fetch`].
pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, UpstreamError>> + Send + 'a>>;

/// Source of weather payloads for a city.
pub trait WeatherProvider: Send + Sync {
    /// Fetches the provider's JSON document for `city`, verbatim.
    fn fetch<'a>(&'a self, city: &'a str) -> ProviderFuture<'a>;
}

/// [`WeatherProvider`] for the Visual Crossing timeline API.
pub struct VisualCrossingClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl VisualCrossingClient {
    /// Builds a client for `base_url` (normally [`VISUAL_CROSSING_BASE_URL`]).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::BaseUrl`] for an unparsable or non-hierarchical
    /// base URL, or [`UpstreamError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(base_url).map_err(|e| UpstreamError::BaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::BaseUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// `{base}/VisualCrossingWebServices/rest/services/timeline/{city}?key={api_key}`
    /// with `city` percent-encoded as a single path segment.
    fn timeline_url(&self, city: &str) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| UpstreamError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(TIMELINE_PATH)
            .push(city);
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_timeline(&self, city: &str) -> Result<Value, UpstreamError> {
        let url = self.timeline_url(city)?;
        let response = self.http.get(url).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "weather provider rejected request");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        debug!(bytes = body.len(), "weather provider responded");
        Ok(serde_json::from_str(&body)?)
    }
}

impl WeatherProvider for VisualCrossingClient {
    fn fetch<'a>(&'a self, city: &'a str) -> ProviderFuture<'a> {
        Box::pin(self.fetch_timeline(city))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_owned(),
    }
}
