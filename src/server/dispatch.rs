//! Binding, invoking, and reporting for one inbound call.

use super::bind::{bind, BindError, BindSource, Validate};
use super::code::{AppError, Code};
use crate::BoxError;
use axum::response::{IntoResponse, Response};
use http::{Extensions, HeaderMap, Method, StatusCode, Uri};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;

/// Per-call context handed to every handler.
#[derive(Debug)]
pub struct Context {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
}

impl Context {
    /// Builds a context from the request head.
    pub fn from_parts(parts: http::request::Parts) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            extensions: parts.extensions,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Values attached by upstream middleware.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::from_parts(http::Request::new(()).into_parts().0)
    }
}

/// A handler of the shape `async fn(Context, XxxReq) -> Result<XxxRes, E>`.
///
/// Implemented for every async function and closure with that shape.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid handler",
    label = "expected `async fn(Context, XxxReq) -> Result<XxxRes, E>`",
    note = "handlers take exactly a `skein::server::Context` and a request value, and return a `Result` whose error implements `std::error::Error`"
)]
pub trait HandlerFn<Req, Res>: Clone + Send + Sync + 'static {
    /// The handler's error type.
    type Error: std::error::Error + Send + Sync + 'static;
    /// The future returned by [`call`](Self::call).
    type Future: Future<Output = Result<Res, Self::Error>> + Send + 'static;

    /// Invokes the handler.
    fn call(&self, ctx: Context, req: Req) -> Self::Future;
}

impl<F, Fut, Req, Res, E> HandlerFn<Req, Res> for F
where
    F: Fn(Context, Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Res, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;
    type Future = Fut;

    fn call(&self, ctx: Context, req: Req) -> Self::Future {
        self(ctx, req)
    }
}

/// A handler's successful result, waiting for response middleware to render it.
///
/// It travels in the response extensions; the envelope middleware installed
/// by [`Api::into_router`](super::Api::into_router) serializes it.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    value: serde_json::Value,
}

impl HandlerResponse {
    /// The serialized handler result.
    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Consumes the wrapper.
    pub fn into_value(self) -> serde_json::Value {
        self.value
    }
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        let mut response = StatusCode::OK.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Why a dispatch did not produce a [`HandlerResponse`].
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    /// A structured application error, including translated validation failures.
    #[error(transparent)]
    App(#[from] AppError),

    /// Binding failed for a reason other than validation.
    #[error(transparent)]
    Bind(BindError),

    /// The handler returned an error.
    #[error(transparent)]
    Handler(BoxError),

    /// The handler's result could not be serialized.
    #[error("failed to serialize handler response: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl DispatchError {
    /// The application error this failure is reported as.
    ///
    /// Handler errors that are [`AppError`]s keep their code; any other
    /// handler error is an internal error.
    pub fn to_app_error(&self) -> AppError {
        match self {
            DispatchError::App(e) => e.clone(),
            DispatchError::Bind(e) => AppError::new_code(Code::INVALID_PARAMETER, e.to_string()),
            DispatchError::Handler(e) => match e.downcast_ref::<AppError>() {
                Some(app) => app.clone(),
                None => AppError::new_code(Code::INTERNAL_ERROR, e.to_string()),
            },
            DispatchError::Serialize(e) => AppError::new_code(Code::INTERNAL_ERROR, e.to_string()),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        self.to_app_error().into_response()
    }
}

/// Binds a fresh `Req` from `source`, runs `handler`, and wraps its result.
///
/// Validation failures become a single [`Code::VALIDATION_FAILED`] error
/// carrying the first failing field's message; other binding errors and
/// handler errors are passed through as they are.
pub async fn dispatch<H, Req, Res>(
    handler: &H,
    ctx: Context,
    source: BindSource<'_>,
) -> Result<HandlerResponse, DispatchError>
where
    H: HandlerFn<Req, Res>,
    Req: DeserializeOwned + Validate,
    Res: Serialize,
{
    let req: Req = match bind(&source) {
        Ok(req) => req,
        Err(BindError::Validation(errors)) if errors.first().is_some() => {
            let message = errors.first().map(|e| e.message.clone()).unwrap_or_default();
            tracing::debug!(
                path = %ctx.uri().path(),
                failures = errors.errors().len(),
                message = %message,
                "Request validation failed"
            );
            return Err(AppError::new_code(Code::VALIDATION_FAILED, message).into());
        }
        Err(e) => {
            tracing::debug!(path = %ctx.uri().path(), error = %e, "Request binding failed");
            return Err(DispatchError::Bind(e));
        }
    };

    let path = ctx.uri().path().to_string();
    let res = handler.call(ctx, req).await.map_err(|e| {
        tracing::warn!(path = %path, error = %e, "Handler returned an error");
        DispatchError::Handler(Box::new(e))
    })?;

    let value = serde_json::to_value(&res).map_err(DispatchError::Serialize)?;
    Ok(HandlerResponse { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ValidationErrors;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Deserialize)]
    struct EchoReq {
        text: String,
        #[serde(default)]
        times: u8,
    }

    impl Validate for EchoReq {
        fn validate(&self) -> Result<(), ValidationErrors> {
            let mut errors = ValidationErrors::new();
            if self.text.is_empty() {
                errors.add("text", "text is required");
            }
            if self.times > 5 {
                errors.add("times", "times must be at most 5");
            }
            errors.into_result()
        }
    }

    #[derive(Serialize)]
    struct EchoRes {
        echoed: String,
    }

    async fn echo(_ctx: Context, req: EchoReq) -> Result<EchoRes, AppError> {
        Ok(EchoRes {
            echoed: req.text.repeat(req.times.max(1) as usize),
        })
    }

    fn query(q: &str) -> BindSource<'_> {
        BindSource {
            query: Some(q),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_success_surfaces_handler_response() {
        let out = dispatch(&echo, Context::default(), query("text=ab&times=2"))
            .await
            .unwrap();
        assert_eq!(out.value(), &serde_json::json!({"echoed": "abab"}));
    }

    #[tokio::test]
    async fn test_first_validation_failure_wins() {
        let err = dispatch(&echo, Context::default(), query("text=&times=9"))
            .await
            .unwrap_err();

        match err {
            DispatchError::App(app) => {
                assert_eq!(app.code(), Code::VALIDATION_FAILED);
                assert_eq!(app.message(), "text is required");
            }
            other => panic!("Expected App error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_failure_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = {
            let calls = calls.clone();
            move |_ctx: Context, req: EchoReq| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, AppError>(EchoRes { echoed: req.text })
                }
            }
        };

        let err = dispatch(&counting, Context::default(), query("times=abc"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Bind(BindError::Query(_))));
        assert_eq!(err.to_app_error().code(), Code::INVALID_PARAMETER);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_propagates_unchanged() {
        async fn missing(_ctx: Context, _req: EchoReq) -> Result<EchoRes, AppError> {
            Err(AppError::new_code(Code::NOT_FOUND, "no such echo"))
        }

        let err = dispatch(&missing, Context::default(), query("text=a"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Handler(_)));
        let app = err.to_app_error();
        assert_eq!(app.code(), Code::NOT_FOUND);
        assert_eq!(app.message(), "no such echo");
    }

    #[tokio::test]
    async fn test_foreign_handler_error_is_internal() {
        async fn broken(_ctx: Context, _req: EchoReq) -> Result<EchoRes, std::io::Error> {
            Err(std::io::Error::other("disk full"))
        }

        let err = dispatch(&broken, Context::default(), query("text=a"))
            .await
            .unwrap_err();

        let app = err.to_app_error();
        assert_eq!(app.code(), Code::INTERNAL_ERROR);
        assert_eq!(app.message(), "disk full");
    }
}
