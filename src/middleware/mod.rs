//! Middleware pipeline — composable before/after request handler logic.
//!
//! Each middleware wraps the next layer and may pass the request through,
//! short-circuit with its own response (rate limiting does this), or decorate
//! the downstream response.
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`LoggerMiddleware`] — request/response access log.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Response, StatusCode, context::Context};

/// Boxed, `Send` future returned by middleware and handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A type-erased, reference-counted middleware function.
///
/// The final entry of a chain is usually the route handler itself, wrapped so
/// that it ignores its [`Next`].
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxFuture<Response> + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward a
/// request at most once.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    index: usize,
}

impl Next {
    /// Creates a cursor positioned at the start of `middlewares`.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// An exhausted chain yields `500 Internal Server Error`.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core middleware trait.
///
/// Implementations must be `Send + Sync` because one instance is shared by
/// every connection task, and must not hold locks across `.await` points.
pub trait Middleware: Send + Sync {
    /// Handle the request, optionally delegating to `next`.
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Response>;
}

/// Logs method, path, peer, status and latency of every request once the
/// downstream response is available.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Response> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();
            let peer = ctx
                .request()
                .remote_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "-".to_owned());

            let response = next.run(ctx).await;

            let status = response.status().as_u16();
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if response.status().is_server_error() {
                tracing::warn!(%method, %path, %peer, status, elapsed_ms, "request failed");
            } else {
                tracing::info!(%method, %path, %peer, status, elapsed_ms, "request completed");
            }

            response
        })
    }
}
