//! Inbound handler dispatch.
//!
//! Handlers have the fixed shape `async fn(Context, XxxReq) -> Result<XxxRes, E>`.
//! [`Api::register`] checks each handler's contract once and mounts it on an
//! axum router; every call then binds and validates a fresh request value,
//! invokes the handler, and hands its result to response middleware.

mod api;
mod bind;
mod code;
mod contract;
mod dispatch;

pub use api::{Api, RegisterError, RouteInfo, DEFAULT_BODY_LIMIT};
pub use bind::{bind, BindError, BindSource, FieldError, Validate, ValidationErrors};
pub use code::{AppError, Code, Envelope};
pub use contract::{check as check_contract, Contract, ContractViolation, REQUEST_SUFFIX, RESPONSE_SUFFIX};
pub use dispatch::{dispatch, Context, DispatchError, HandlerFn, HandlerResponse};
