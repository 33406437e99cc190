//! Composable interceptors around the transport call.
//!
//! A [`Handler`] turns an outgoing request into a [`Response`]; a
//! [`Middleware`] wraps one handler into another. [`compose`] folds a list of
//! middlewares around a terminal handler so that index 0 is the outermost
//! layer: it sees the request first and the response last.
//!
//! ```text
//!   request ─▶ A ─▶ B ─▶ terminal (transport)
//!   response ◀─ A ◀─ B ◀─┘
//! ```

use crate::{Error, Response, Result};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Consumes an outgoing request and produces its response.
pub type Handler = Arc<dyn Fn(reqwest::Request) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Wraps a handler into a new handler.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Wraps `terminal` with `middlewares`, index 0 outermost.
pub fn compose(terminal: Handler, middlewares: &[Middleware]) -> Handler {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, middleware| middleware(next))
}

/// Builds a middleware from an async function of `(request, next)`.
///
/// The function may modify the request before calling `next`, return its own
/// response without calling `next` at all, or post-process what `next` returns.
///
/// # Examples
///
/// ```
/// use skein::middleware::{self, Handler};
///
/// let stamp = middleware::from_fn(|mut req: reqwest::Request, next: Handler| async move {
///     req.headers_mut()
///         .insert("x-trace", http::HeaderValue::from_static("on"));
///     next(req).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(reqwest::Request, Handler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next: Handler| {
        let f = Arc::clone(&f);
        let handler: Handler = Arc::new(move |req: reqwest::Request| f(req, Arc::clone(&next)).boxed());
        handler
    })
}

/// Logs every exchange that passes through it.
pub fn trace() -> Middleware {
    from_fn(|req: reqwest::Request, next: Handler| async move {
        let method = req.method().clone();
        let url = req.url().clone();
        let started = Instant::now();

        tracing::debug!(method = %method, url = %url, "Sending request");
        let result = next(req).await;

        match &result {
            Ok(response) => tracing::info!(
                method = %method,
                url = %url,
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis(),
                "Received response"
            ),
            Err(e) => tracing::warn!(
                method = %method,
                url = %url,
                error = %e,
                elapsed_ms = started.elapsed().as_millis(),
                "Request failed"
            ),
        }
        result
    })
}

/// Turns non-2xx responses into [`Error::Status`].
pub fn fail_on_status() -> Middleware {
    from_fn(|req: reqwest::Request, next: Handler| async move {
        let response = next(req).await?;
        response.error_for_status().await
    })
}

pub(crate) fn terminal(transport: Arc<dyn crate::Transport>) -> Handler {
    Arc::new(move |req: reqwest::Request| {
        let transport = Arc::clone(&transport);
        async move {
            let raw = transport.execute(req).await?;
            Ok::<_, Error>(Response::new(raw))
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};
    use parking_lot::Mutex;

    fn request() -> reqwest::Request {
        reqwest::Request::new(
            http::Method::GET,
            "http://localhost/".parse().unwrap(),
        )
    }

    fn recording(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> Middleware {
        from_fn(move |req: reqwest::Request, next: Handler| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(format!("{name} in"));
                let result = next(req).await;
                log.lock().push(format!("{name} out"));
                result
            }
        })
    }

    fn ok_terminal(log: Arc<Mutex<Vec<String>>>) -> Handler {
        Arc::new(move |_req: reqwest::Request| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push("terminal".to_string());
                Ok::<_, Error>(Response::from_parts(StatusCode::OK, HeaderMap::new(), ""))
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_registration_order_in_reverse_order_out() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = compose(
            ok_terminal(log.clone()),
            &[recording(log.clone(), "A"), recording(log.clone(), "B")],
        );

        handler(request()).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["A in", "B in", "terminal", "B out", "A out"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cached = from_fn(|_req: reqwest::Request, _next: Handler| async move {
            Ok::<_, Error>(Response::from_parts(
                StatusCode::NOT_MODIFIED,
                HeaderMap::new(),
                "",
            ))
        });
        let handler = compose(
            ok_terminal(log.clone()),
            &[cached, recording(log.clone(), "B")],
        );

        let response = handler(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_request_mutation_reaches_terminal() {
        let seen = Arc::new(Mutex::new(None));
        let terminal: Handler = {
            let seen = Arc::clone(&seen);
            Arc::new(move |req: reqwest::Request| {
                *seen.lock() = req
                    .headers()
                    .get("x-added")
                    .map(|v| v.to_str().unwrap_or_default().to_string());
                async { Ok::<_, Error>(Response::from_parts(StatusCode::OK, HeaderMap::new(), "")) }
                    .boxed()
            })
        };
        let add_header = from_fn(|mut req: reqwest::Request, next: Handler| async move {
            req.headers_mut()
                .insert("x-added", http::HeaderValue::from_static("yes"));
            next(req).await
        });

        compose(terminal, &[add_header])(request()).await.unwrap();

        assert_eq!(seen.lock().as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_fail_on_status_converts_errors() {
        let terminal: Handler = Arc::new(|_req: reqwest::Request| {
            async {
                Ok::<_, Error>(Response::from_parts(
                    StatusCode::BAD_GATEWAY,
                    HeaderMap::new(),
                    "upstream down",
                ))
            }
            .boxed()
        });

        let result = compose(terminal, &[fail_on_status()])(request()).await;

        match result {
            Err(Error::Status {
                status,
                raw_response,
                ..
            }) => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(raw_response, "upstream down");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }
}
