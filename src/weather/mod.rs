//! Cache-aside weather lookups and the HTTP handlers that expose them.
//!
//! A lookup reads `weather:<city>` from the [`CacheStore`]; on a miss it asks
//! the [`WeatherProvider`] and writes the payload back with the configured
//! TTL. Provider failures are returned to the caller and never cached.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::context::Context;
use crate::error::ApiError;
use crate::upstream::WeatherProvider;
use crate::{Response, StatusCode};

/// Default lifetime of a cached payload: 12 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Canonical form of a city name for cache keys: trimmed and lowercased.
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

/// Cache key for `city`, e.g. `weather:new york`.
pub fn cache_key(city: &str) -> String {
    format!("weather:{}", normalize_city(city))
}

/// Weather lookups backed by a cache store and an upstream provider.
pub struct WeatherService {
    cache: Arc<dyn CacheStore>,
    provider: Arc<dyn WeatherProvider>,
    ttl: Duration,
}

impl WeatherService {
    pub fn new(cache: Arc<dyn CacheStore>, provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            cache,
            provider,
            ttl: DEFAULT_TTL,
        }
    }

    /// Overrides how long fetched payloads stay cached.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the weather payload for `city`, from cache when possible.
    ///
    /// # Errors
    ///
    /// - [`ApiError::MissingCity`] if `city` is blank.
    /// - [`ApiError::Cache`] if the store fails on read or write.
    /// - [`ApiError::Decode`] if a cached entry is not valid JSON.
    /// - [`ApiError::Upstream`] if the provider fails; nothing is cached.
    pub async fn lookup(&self, city: &str) -> Result<Value, ApiError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(ApiError::MissingCity);
        }

        let key = cache_key(city);
        if let Some(raw) = self.cache.get(&key).await? {
            debug!(%key, "cache hit");
            return serde_json::from_str(&raw).map_err(ApiError::Decode);
        }

        debug!(%key, "cache miss");
        let payload = self.provider.fetch(city).await?;

        // Serializing a `Value` cannot fail.
        let raw = payload.to_string();
        self.cache.set(&key, raw, self.ttl).await?;
        info!(%key, ttl_secs = self.ttl.as_secs(), "cached weather payload");

        Ok(payload)
    }
}

/// `GET /`
pub async fn index(_ctx: Context) -> Response {
    Response::new(StatusCode::Ok).body("Hello World")
}

/// `GET /api/weather?city=<name>`
pub async fn weather(ctx: Context) -> Response {
    let Some(service) = ctx.state::<WeatherService>() else {
        error!("weather handler invoked without a WeatherService");
        return ApiError::NotConfigured.into_response();
    };

    let city = ctx.request().query_param("city").unwrap_or_default();
    match service.lookup(city).await {
        Ok(payload) => Response::new(StatusCode::Ok).json(&payload),
        Err(err) => {
            match &err {
                ApiError::MissingCity => debug!("rejected weather request without city"),
                ApiError::Upstream(e) => warn!(city, error = %e, "weather provider failed"),
                other => error!(city, error = %other, "weather lookup failed"),
            }
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryStore, StoreFuture};
    use crate::upstream::{ProviderFuture, UpstreamError};
    use crate::{Request, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider returning a fixed payload (or a 500) and counting calls.
    struct MockProvider {
        payload: Option<Value>,
        calls: AtomicUsize,
        cities: std::sync::Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn ok(payload: Value) -> Arc<Self> {
            Arc::new(Self {
                payload: Some(payload),
                calls: AtomicUsize::new(0),
                cities: std::sync::Mutex::default(),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                payload: None,
                calls: AtomicUsize::new(0),
                cities: std::sync::Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl WeatherProvider for MockProvider {
        fn fetch<'a>(&'a self, city: &'a str) -> ProviderFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cities.lock().unwrap().push(city.to_owned());
            let result = match &self.payload {
                Some(payload) => Ok(payload.clone()),
                None => Err(UpstreamError::Status {
                    status: 500,
                    body: "upstream down".to_owned(),
                }),
            };
            Box::pin(async move { result })
        }
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, Option<String>> {
            Box::pin(async { Err(CacheError::Unavailable("connection refused".to_owned())) })
        }

        fn set<'a>(&'a self, _key: &'a str, _value: String, _ttl: Duration) -> StoreFuture<'a, ()> {
            Box::pin(async { Err(CacheError::Unavailable("connection refused".to_owned())) })
        }
    }

    fn service(cache: Arc<dyn CacheStore>, provider: Arc<dyn WeatherProvider>) -> WeatherService {
        WeatherService::new(cache, provider)
    }

    fn router(service: WeatherService) -> Router {
        let mut router = Router::new();
        router.with_state(service);
        router.get("/", index);
        router.get("/api/weather", weather);
        router
    }

    fn get(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn json_body(response: &Response) -> Value {
        serde_json::from_slice(response.content()).unwrap()
    }

    #[test]
    fn cache_key_normalizes_case_and_whitespace() {
        assert_eq!(cache_key("Paris"), "weather:paris");
        assert_eq!(cache_key("  paris "), "weather:paris");
        assert_eq!(cache_key("New York"), "weather:new york");
    }

    #[tokio::test]
    async fn miss_fetches_once_then_serves_from_cache() {
        let cache = Arc::new(MemoryStore::new());
        let provider = MockProvider::ok(json!({ "temp": 15 }));
        let service = service(cache.clone(), provider.clone());

        assert_eq!(service.lookup("London").await.unwrap(), json!({ "temp": 15 }));
        assert_eq!(service.lookup("London").await.unwrap(), json!({ "temp": 15 }));

        assert_eq!(provider.calls(), 1);
        assert_eq!(
            cache.get("weather:london").await.unwrap().as_deref(),
            Some(r#"{"temp":15}"#)
        );
    }

    #[tokio::test]
    async fn cached_city_skips_provider() {
        let cache = Arc::new(MemoryStore::new());
        cache
            .set("weather:oslo", r#"{"temp":-3}"#.to_owned(), DEFAULT_TTL)
            .await
            .unwrap();
        let provider = MockProvider::ok(json!({ "temp": 99 }));
        let service = service(cache, provider.clone());

        assert_eq!(service.lookup("Oslo").await.unwrap(), json!({ "temp": -3 }));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn city_case_shares_one_entry() {
        let cache = Arc::new(MemoryStore::new());
        let provider = MockProvider::ok(json!({ "resolvedAddress": "Paris, France" }));
        let service = service(cache.clone(), provider.clone());

        service.lookup("Paris").await.unwrap();
        service.lookup("paris").await.unwrap();
        service.lookup(" PARIS ").await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(provider.cities.lock().unwrap().as_slice(), ["Paris"]);
    }

    #[tokio::test]
    async fn blank_city_is_rejected_before_any_io() {
        let provider = MockProvider::ok(json!({}));
        let service = service(Arc::new(BrokenStore), provider.clone());

        assert!(matches!(service.lookup("   ").await, Err(ApiError::MissingCity)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_not_cached() {
        let cache = Arc::new(MemoryStore::new());
        let provider = MockProvider::failing();
        let service = service(cache.clone(), provider.clone());

        assert!(matches!(service.lookup("Atlantis").await, Err(ApiError::Upstream(_))));
        assert!(matches!(service.lookup("Atlantis").await, Err(ApiError::Upstream(_))));

        assert_eq!(provider.calls(), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_a_decode_error() {
        let cache = Arc::new(MemoryStore::new());
        cache
            .set("weather:rome", "not json".to_owned(), DEFAULT_TTL)
            .await
            .unwrap();
        let service = service(cache, MockProvider::ok(json!({})));

        let err = service.lookup("Rome").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert_eq!(err.status(), StatusCode::InternalServerError);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_fetched_again() {
        let provider = MockProvider::ok(json!({ "temp": 20 }));
        let service = service(Arc::new(MemoryStore::new()), provider.clone())
            .with_ttl(Duration::from_secs(60));

        service.lookup("Madrid").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        service.lookup("Madrid").await.unwrap();

        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn index_says_hello() {
        let router = router(service(Arc::new(MemoryStore::new()), MockProvider::ok(json!({}))));
        let response = router.route(get("/")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.content(), b"Hello World");
    }

    #[tokio::test]
    async fn weather_without_city_is_400() {
        let router = router(service(Arc::new(MemoryStore::new()), MockProvider::ok(json!({}))));

        for path in ["/api/weather", "/api/weather?city=", "/api/weather?town=Oslo"] {
            let response = router.route(get(path)).await;
            assert_eq!(response.status(), StatusCode::BadRequest, "{path}");
            assert_eq!(json_body(&response), json!({ "error": "City is required" }));
        }
    }

    #[tokio::test]
    async fn weather_returns_payload_and_caches_it() {
        let provider = MockProvider::ok(json!({ "temp": 15 }));
        let router = router(service(Arc::new(MemoryStore::new()), provider.clone()));

        for _ in 0..2 {
            let response = router.route(get("/api/weather?city=London")).await;
            assert_eq!(response.status(), StatusCode::Ok);
            assert_eq!(json_body(&response), json!({ "temp": 15 }));
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn weather_decodes_city_from_query() {
        let provider = MockProvider::ok(json!({}));
        let router = router(service(Arc::new(MemoryStore::new()), provider.clone()));

        router.route(get("/api/weather?city=New%20York")).await;
        router.route(get("/api/weather?city=new+york")).await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.cities.lock().unwrap().as_slice(), ["New York"]);
    }

    #[tokio::test]
    async fn weather_upstream_failure_is_502() {
        let router = router(service(Arc::new(MemoryStore::new()), MockProvider::failing()));

        let response = router.route(get("/api/weather?city=Atlantis")).await;
        assert_eq!(response.status(), StatusCode::BadGateway);
        assert_eq!(
            json_body(&response),
            json!({ "error": "weather provider returned 500: upstream down" })
        );
    }

    #[tokio::test]
    async fn weather_store_failure_is_500_with_message() {
        let provider = MockProvider::ok(json!({}));
        let router = router(service(Arc::new(BrokenStore), provider.clone()));

        let response = router.route(get("/api/weather?city=Berlin")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert_eq!(
            json_body(&response),
            json!({ "error": "cache store unavailable: connection refused" })
        );
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn weather_without_service_is_500() {
        let mut router = Router::new();
        router.get("/api/weather", weather);

        let response = router.route(get("/api/weather?city=Oslo")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }
}
