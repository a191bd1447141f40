//! Request routing and middleware composition.
//!
//! [`Router`] maps a method and an exact path to a handler, runs the
//! middleware whose prefix covers the request path, and hands every request a
//! clone of the router's shared state.
//!
//! Trailing slashes are ignored on both registered and request paths.
//! Middleware runs even when no route matches, so a layer on `/api` also
//! guards unknown `/api/...` paths that end in a 404.

use std::sync::Arc;

use crate::context::{Context, Extensions};
use crate::middleware::{BoxFuture, Middleware, MiddlewareHandler, Next, from_middleware};
use crate::{Method, Request, Response, StatusCode};

/// Conversion trait for async handler functions.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Response> + Send`
/// that is also `Send + Sync + 'static`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture<Response>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Response> {
        Box::pin((self)(ctx))
    }
}

type Handler = Arc<dyn IntoHandler>;

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

// A middleware and the path prefix it guards (`None` guards everything).
struct Layer {
    prefix: Option<String>,
    handler: MiddlewareHandler,
}

impl Layer {
    fn applies_to(&self, path: &str) -> bool {
        match &self.prefix {
            None => true,
            Some(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

/// HTTP request router.
///
/// Routes are evaluated in registration order and the first match wins; when
/// nothing matches the chain ends in `404 Not Found`. Layers run in
/// registration order, outermost first.
///
/// # Examples
///
/// ```rust,no_run
/// use skycache::{Router, Response, StatusCode};
/// use skycache::middleware::LoggerMiddleware;
/// use skycache::context::Context;
///
/// let mut router = Router::new();
/// router.layer(LoggerMiddleware);
/// router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok).body("Hello World") });
/// ```
pub struct Router {
    routes: Vec<Route>,
    layers: Vec<Layer>,
    state: Extensions,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            layers: Vec::new(),
            state: Extensions::new(),
        }
    }

    /// Registers a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.on(Method::Get, path, handler);
    }

    /// Registers a handler for `method` requests matching `path`.
    pub fn on(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.routes.push(Route {
            method,
            path: trim_trailing_slash(path).to_owned(),
            handler: Arc::new(handler),
        });
    }

    /// Adds a middleware that runs for every request.
    pub fn layer(&mut self, middleware: impl Middleware + 'static) {
        self.layers.push(Layer {
            prefix: None,
            handler: from_middleware(Arc::new(middleware)),
        });
    }

    /// Adds a middleware that runs only for `prefix` and paths below it.
    pub fn layer_prefix(&mut self, prefix: &str, middleware: impl Middleware + 'static) {
        self.layers.push(Layer {
            prefix: Some(trim_trailing_slash(prefix).to_owned()),
            handler: from_middleware(Arc::new(middleware)),
        });
    }

    /// Makes `state` available to every handler through [`Context::state`].
    pub fn with_state<T>(&mut self, state: T)
    where
        T: Send + Sync + 'static,
    {
        self.state.insert(state);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs `request` through the applicable layers and the matching route.
    pub async fn route(&self, request: Request) -> Response {
        let path = request.path().to_owned();
        let lookup = trim_trailing_slash(&path);

        let matched = self
            .routes
            .iter()
            .find(|route| &route.method == request.method() && route.path == lookup)
            .map(|route| Arc::clone(&route.handler));

        let endpoint: MiddlewareHandler = match matched {
            Some(handler) => Arc::new(move |ctx: Context, _next: Next| handler.call(ctx)),
            None => Arc::new(|_ctx: Context, _next: Next| -> BoxFuture<Response> {
                Box::pin(async { Response::new(StatusCode::NotFound) })
            }),
        };

        let mut chain: Vec<MiddlewareHandler> = self
            .layers
            .iter()
            .filter(|layer| layer.applies_to(&path))
            .map(|layer| Arc::clone(&layer.handler))
            .collect();
        chain.push(endpoint);

        let ctx = Context::new(request).with_extensions(self.state.clone());
        Next::new(chain).run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    struct Counting(Arc<AtomicUsize>);

    impl Middleware for Counting {
        fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Response> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(next.run(ctx))
        }
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(trim_trailing_slash("/api/weather/"), "/api/weather");
        assert_eq!(trim_trailing_slash("/api/weather"), "/api/weather");
        assert_eq!(trim_trailing_slash("/"), "/");
    }

    #[tokio::test]
    async fn routes_match_exact_paths_only() {
        let mut router = Router::new();
        router.get("/api/weather/", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/", |_ctx: Context| async { Response::new(StatusCode::NoContent) });

        assert_eq!(router.route(make_request("GET", "/api/weather")).await.status(), StatusCode::Ok);
        assert_eq!(router.route(make_request("GET", "/api/weather/")).await.status(), StatusCode::Ok);
        assert_eq!(router.route(make_request("GET", "/")).await.status(), StatusCode::NoContent);
        assert_eq!(router.route(make_request("GET", "/api")).await.status(), StatusCode::NotFound);
        assert_eq!(
            router.route(make_request("GET", "/api/weather/oslo")).await.status(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn layer_prefix_respects_segment_boundaries() {
        let layer = Layer {
            prefix: Some("/api".to_owned()),
            handler: from_middleware(Arc::new(Counting(Arc::default()))),
        };
        assert!(layer.applies_to("/api"));
        assert!(layer.applies_to("/api/weather"));
        assert!(!layer.applies_to("/apiary"));
        assert!(!layer.applies_to("/"));
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let mut router = Router::new();
        router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.len(), 1);
        let res = router.route(make_request("GET", "/nope")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn method_must_match() {
        let mut router = Router::new();
        router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("POST", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::NoContent) });
        let res = router.route(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn prefix_layer_runs_only_under_prefix() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        router.layer_prefix("/api", Counting(Arc::clone(&hits)));
        router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/api/weather", |_ctx: Context| async { Response::new(StatusCode::Ok) });

        router.route(make_request("GET", "/")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        router.route(make_request("GET", "/api/weather")).await;
        let res = router.route(make_request("GET", "/api/unknown")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handlers_receive_state() {
        struct Greeting(String);

        let mut router = Router::new();
        router.with_state(Greeting("hello".to_owned()));
        router.get("/greet", |ctx: Context| async move {
            let greeting = ctx.state::<Greeting>().map(|g| g.0.clone()).unwrap_or_default();
            let name = ctx.request().query_param("name").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(format!("{greeting} {name}"))
        });

        let res = router.route(make_request("GET", "/greet?name=ana")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.content(), b"hello ana");
    }
}
