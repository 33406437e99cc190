//! # Skein - HTTP request execution and typed handler dispatch
//!
//! Skein has two halves that share an error and logging story:
//!
//! * an **outbound** engine: a [`Client`] hands out [`Request`] builders that
//!   materialize their body once, run through an ordered middleware chain, and
//!   retry according to a [`RetryPolicy`], with cancellable waits;
//! * an **inbound** engine in [`server`]: handlers of the fixed shape
//!   `async fn(Context, XxxReq) -> Result<XxxRes, E>` are contract-checked once
//!   at registration, then dispatched with request binding and validation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use skein::{Client, CancelToken};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), skein::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .middleware(skein::middleware::trace())
//!         .build()?;
//!
//!     // GET with up to two retries, 100ms apart
//!     let user = client
//!         .request()
//!         .retry(2, Duration::from_millis(100))
//!         .send_json::<User>("/users/123")
//!         .await?;
//!     println!("User: {} ({} attempts)", user.data.name, user.attempts);
//!
//!     // POST a JSON body, cancellable from elsewhere
//!     let token = CancelToken::new();
//!     let created = client
//!         .request()
//!         .cancel_token(token.clone())
//!         .json(&CreateUser { name: "Alice".to_string() })
//!         .post("/users")
//!         .await?;
//!     println!("Created: {}", created.status());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Middleware
//!
//! Middlewares registered as `[A, B]` see the request in order A, B and the
//! response in order B, A. Client-level middlewares wrap request-level ones.
//!
//! ```no_run
//! use skein::{middleware, Client};
//!
//! # fn example() -> Result<(), skein::Error> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com")?
//!     .middleware(middleware::trace())
//!     .middleware(middleware::fail_on_status())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod body;
mod cancel;
mod client;
mod error;
pub mod middleware;
pub mod rate_limit;
mod request;
mod response;
pub mod retry;
pub mod server;

pub use cancel::CancelToken;
pub use client::{Client, ClientBuilder, ClientConfig, Transport};
pub use error::{BoxError, Error, Result};
pub use request::{join_url, Request};
pub use response::{Reply, Response};
pub use retry::{Backoff, RetryPolicy, RetryPredicate};
