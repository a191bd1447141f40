use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::json;
use tokio::time::Instant;

use crate::context::Context;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::{Request, Response, StatusCode};

/// 100 requests per hour.
const DEFAULT_MAX_REQUESTS: NonZeroU32 = NonZeroU32::new(100).unwrap();
const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Quota applied to each client address.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    max_requests: NonZeroU32,
    window: Duration,
    trust_forwarded: bool,
}

impl RateLimitConfig {
    /// At most `max_requests` in any `window`-long span.
    ///
    /// Returns `None` if either value is zero.
    pub fn new(max_requests: u32, window: Duration) -> Option<Self> {
        let max_requests = NonZeroU32::new(max_requests)?;
        if window.is_zero() {
            return None;
        }
        Some(Self {
            max_requests,
            window,
            trust_forwarded: false,
        })
    }

    /// Key clients by the first `X-Forwarded-For` hop instead of the peer
    /// address. Only enable behind a proxy that sets the header.
    #[must_use]
    pub fn trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests.get()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
            trust_forwarded: false,
        }
    }
}

/// Outcome of counting one request against a client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Per-client request limiter over a rolling window.
///
/// Each client keeps the instants of its accepted requests from the last
/// `window`. A request is accepted only while fewer than `max_requests` are
/// on record; rejected requests are not recorded. Clients over quota get
/// `429 Too Many Requests` with a `Retry-After` header (time until their
/// oldest recorded request leaves the window) and never reach the downstream
/// handler. Allowed responses carry `X-RateLimit-Limit` and
/// `X-RateLimit-Remaining`.
///
/// Clones share the same client table, so one clone can be installed on the
/// router while another is kept for [`prune`](Self::prune).
#[derive(Clone)]
pub struct RateLimitMiddleware {
    clients: Arc<DashMap<IpAddr, VecDeque<Instant>>>,
    config: RateLimitConfig,
    message: Arc<str>,
}

impl RateLimitMiddleware {
    pub fn new(config: RateLimitConfig) -> Self {
        let message = format!(
            "You have exceeded the {} requests in {} limit!",
            config.max_requests(),
            describe_window(config.window)
        );
        Self {
            clients: Arc::new(DashMap::new()),
            config,
            message: message.into(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Records a request from `client` at `now` if its window has room.
    pub fn check(&self, client: IpAddr, now: Instant) -> Decision {
        let window = self.config.window;
        let max = self.config.max_requests.get() as usize;

        let mut log = self.clients.entry(client).or_default();
        while log
            .front()
            .is_some_and(|&at| now.saturating_duration_since(at) >= window)
        {
            log.pop_front();
        }

        if log.len() >= max {
            let oldest = log.front().copied().unwrap_or(now);
            let retry_after = window.saturating_sub(now.saturating_duration_since(oldest));
            return Decision::Limited { retry_after };
        }

        log.push_back(now);
        Decision::Allowed {
            remaining: (max - log.len()) as u32,
        }
    }

    /// Drops clients with no request inside the window.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.clients.retain(|_, log| {
            log.back()
                .is_some_and(|&at| now.saturating_duration_since(at) < window)
        });
        self.clients.shrink_to_fit();
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    fn client_key(&self, request: &Request) -> IpAddr {
        if self.config.trust_forwarded {
            let forwarded = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|value| value.split(',').next())
                .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
            if let Some(ip) = forwarded {
                return ip;
            }
        }
        request
            .remote_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    fn too_many_requests(&self, retry_after: Duration) -> Response {
        // Round up so clients never retry a moment too early.
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        Response::new(StatusCode::TooManyRequests)
            .header("Retry-After", secs.max(1).to_string())
            .header("X-RateLimit-Limit", self.config.max_requests().to_string())
            .header("X-RateLimit-Remaining", "0")
            .json(&json!({
                "error": "Too many requests, please try again later.",
                "message": &*self.message,
            }))
    }
}

impl Middleware for RateLimitMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Response> {
        let client = self.client_key(ctx.request());

        match self.check(client, Instant::now()) {
            Decision::Allowed { remaining } => {
                let limit = self.config.max_requests().to_string();
                Box::pin(async move {
                    let mut response = next.run(ctx).await;
                    response.add_header("X-RateLimit-Limit", limit);
                    response.add_header("X-RateLimit-Remaining", remaining.to_string());
                    response
                })
            }
            Decision::Limited { retry_after } => {
                tracing::warn!(
                    %client,
                    path = ctx.request().path(),
                    retry_after_secs = retry_after.as_secs(),
                    "rate limit exceeded"
                );
                let response = self.too_many_requests(retry_after);
                Box::pin(async move { response })
            }
        }
    }
}

/// Human-readable window length: `1 hour`, `15 minutes`, `90 seconds`.
fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    let (count, unit) = if secs > 0 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs > 0 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
