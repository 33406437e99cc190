//! Explicit handler registration on top of an axum [`Router`].

use super::bind::{BindError, BindSource, Validate};
use super::code::Envelope;
use super::contract::{Contract, ContractViolation};
use super::dispatch::{dispatch, Context, DispatchError, HandlerFn, HandlerResponse};
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{on, MethodFilter},
    Json, Router,
};
use http::{header::CONTENT_TYPE, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

/// Default cap on request bodies read for binding.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// A registered route, as listed by [`Api::routes`].
#[derive(Debug, Clone)]
pub struct RouteInfo {
    /// The HTTP method.
    pub method: Method,
    /// The axum path pattern.
    pub path: String,
    /// A one-line description.
    pub summary: String,
    /// The handler's checked request/response types.
    pub contract: Contract,
}

/// Why a handler could not be registered.
#[derive(thiserror::Error, Debug)]
pub enum RegisterError {
    #[error("invalid handler for {method} {path}: {source}")]
    Contract {
        method: Method,
        path: String,
        #[source]
        source: ContractViolation,
    },

    #[error("duplicate route: {method} {path}")]
    Duplicate { method: Method, path: String },

    #[error("unsupported method: {0}")]
    UnsupportedMethod(Method),

    #[error("invalid route path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

/// A set of typed handlers, turned into a router once registration is done.
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use skein::server::{Api, AppError, Context, Validate};
///
/// #[derive(Deserialize)]
/// struct HelloReq {
///     name: String,
/// }
///
/// impl Validate for HelloReq {}
///
/// #[derive(Serialize)]
/// struct HelloRes {
///     greeting: String,
/// }
///
/// async fn hello(_ctx: Context, req: HelloReq) -> Result<HelloRes, AppError> {
///     Ok(HelloRes {
///         greeting: format!("hello, {}", req.name),
///     })
/// }
///
/// # fn main() -> Result<(), skein::server::RegisterError> {
/// let api = Api::new().register(http::Method::GET, "/api/v1/hello", "Say hello", hello)?;
/// assert_eq!(api.routes().len(), 1);
/// let _router: axum::Router = api.into_router();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Api {
    router: Router,
    routes: Vec<RouteInfo>,
    body_limit: usize,
}

impl Default for Api {
    fn default() -> Self {
        Self::new()
    }
}

impl Api {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            routes: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Caps bodies read by handlers registered after this call.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Checks `handler`'s contract and mounts it at `method path`.
    ///
    /// The contract is checked here, once; a violation, a second handler on
    /// the same method and path, or a method axum cannot route is an error.
    pub fn register<H, Req, Res>(
        mut self,
        method: Method,
        path: &str,
        summary: &str,
        handler: H,
    ) -> Result<Self, RegisterError>
    where
        H: HandlerFn<Req, Res>,
        Req: DeserializeOwned + Validate + Send + 'static,
        Res: Serialize + Send + 'static,
    {
        check_path(path, &self.routes).map_err(|reason| RegisterError::InvalidPath {
            path: path.to_string(),
            reason,
        })?;

        let contract = Contract::of::<Req, Res>().map_err(|source| RegisterError::Contract {
            method: method.clone(),
            path: path.to_string(),
            source,
        })?;

        if self
            .routes
            .iter()
            .any(|route| route.method == method && route.path == path)
        {
            return Err(RegisterError::Duplicate {
                method,
                path: path.to_string(),
            });
        }

        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| RegisterError::UnsupportedMethod(method.clone()))?;

        let limit = self.body_limit;
        let route = on(filter, move |request: Request| {
            let handler = handler.clone();
            async move { serve::<H, Req, Res>(handler, limit, request).await }
        });
        self.router = self.router.route(path, route);

        info!(
            method = %method,
            path = %path,
            request = contract.request_type(),
            response = contract.response_type(),
            "Registered handler"
        );

        self.routes.push(RouteInfo {
            method,
            path: path.to_string(),
            summary: summary.to_string(),
            contract,
        });
        Ok(self)
    }

    /// Routes registered so far, in registration order.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    /// The router with the default envelope middleware installed.
    pub fn into_router(self) -> Router {
        self.router.layer(middleware::from_fn(write_envelope))
    }

    /// The router without response rendering.
    ///
    /// Successful calls answer `200` with an empty body and the
    /// [`HandlerResponse`] in the response extensions, for custom middleware
    /// to render.
    pub fn into_bare_router(self) -> Router {
        self.router
    }
}

/// Rejects paths the router would refuse to mount.
///
/// Captures are whole segments, `{name}` or a trailing `{*name}`. Two routes
/// that reach the same position with differently named captures cannot
/// share a router.
fn check_path(path: &str, routes: &[RouteInfo]) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err("must start with '/'".to_string());
    }

    let segments: Vec<&str> = path.split('/').skip(1).collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err(format!(
                "segment {segment:?} uses the old capture syntax, write `{{name}}` or `{{*name}}`"
            ));
        }
        match capture(segment) {
            Some(Capture::Wildcard(_)) if i + 1 != segments.len() => {
                return Err(format!("wildcard {segment:?} must be the last segment"));
            }
            Some(Capture::Param(name) | Capture::Wildcard(name)) if name.is_empty() => {
                return Err(format!("segment {segment:?} has an empty capture name"));
            }
            None if segment.contains(['{', '}']) => {
                return Err(format!("segment {segment:?} mixes text and captures"));
            }
            _ => {}
        }
    }

    for route in routes {
        let existing = route.path.split('/').skip(1);
        for (theirs, ours) in existing.zip(segments.iter().copied()) {
            if theirs == ours {
                continue;
            }
            if capture(theirs).is_some() && capture(ours).is_some() {
                return Err(format!(
                    "capture {ours:?} conflicts with {theirs:?} in {:?}",
                    route.path
                ));
            }
            break;
        }
    }
    Ok(())
}

enum Capture<'a> {
    Param(&'a str),
    Wildcard(&'a str),
}

fn capture(segment: &str) -> Option<Capture<'_>> {
    let inner = segment.strip_prefix('{')?.strip_suffix('}')?;
    if inner.contains(['{', '}']) {
        return None;
    }
    Some(match inner.strip_prefix('*') {
        Some(name) => Capture::Wildcard(name),
        None => Capture::Param(inner),
    })
}

async fn serve<H, Req, Res>(handler: H, limit: usize, request: Request) -> Response
where
    H: HandlerFn<Req, Res>,
    Req: DeserializeOwned + Validate + Send + 'static,
    Res: Serialize + Send + 'static,
{
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %parts.uri.path(), error = %e, "Failed to read request body");
            return DispatchError::Bind(BindError::Body(e.to_string())).into_response();
        }
    };

    let query = parts.uri.query().map(str::to_owned);
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let source = BindSource {
        query: query.as_deref(),
        content_type: content_type.as_deref(),
        body: &bytes,
    };

    match dispatch(&handler, Context::from_parts(parts), source).await {
        Ok(out) => out.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn write_envelope(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    match response.extensions_mut().remove::<HandlerResponse>() {
        Some(out) => Json(Envelope::ok(out.into_value())).into_response(),
        None => response,
    }
}
