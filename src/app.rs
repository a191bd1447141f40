//! Route table for the weather proxy.

use crate::Router;
use crate::middleware::LoggerMiddleware;
use crate::security::RateLimitMiddleware;
use crate::weather::{self, WeatherService};

/// Path prefix guarded by the rate limiter.
pub const API_PREFIX: &str = "/api";

/// Builds the proxy's router:
///
/// - `GET /` greeting
/// - `GET /api/weather?city=<name>` cached weather lookup
///
/// Every request is access-logged; everything under [`API_PREFIX`] is rate
/// limited, including paths that end in a 404.
pub fn build_router(service: WeatherService, limiter: RateLimitMiddleware) -> Router {
    let mut router = Router::new();
    router.with_state(service);
    router.layer(LoggerMiddleware);
    router.layer_prefix(API_PREFIX, limiter);

    router.get("/", weather::index);
    router.get("/api/weather", weather::weather);
    router
}
