//! # skycache
//!
//! A caching, rate-limited weather API proxy on a from-scratch async HTTP/1.1
//! server.
//!
//! `GET /api/weather?city=<name>` answers from the cache store when it can and
//! otherwise asks the upstream provider, writing successful payloads back for
//! twelve hours. Each client gets a fixed number of `/api` requests per window.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use skycache::app::build_router;
//! use skycache::cache::MemoryStore;
//! use skycache::security::{RateLimitConfig, RateLimitMiddleware};
//! use skycache::server::Server;
//! use skycache::upstream::{VISUAL_CROSSING_BASE_URL, VisualCrossingClient};
//! use skycache::weather::WeatherService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = VisualCrossingClient::new(VISUAL_CROSSING_BASE_URL, "api-key", Duration::from_secs(10))?;
//!     let service = WeatherService::new(Arc::new(MemoryStore::new()), Arc::new(provider));
//!     let router = Arc::new(build_router(service, RateLimitMiddleware::new(RateLimitConfig::default())));
//!
//!     let server = Server::bind("127.0.0.1:3000").await?;
//!     server
//!         .run_until(
//!             move |req| {
//!                 let router = Arc::clone(&router);
//!                 async move { router.route(req).await }
//!             },
//!             async { tokio::signal::ctrl_c().await.ok(); },
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Weather proxy ─────────────────────────────────────────────────────────────
pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod security;
pub mod upstream;
pub mod weather;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
