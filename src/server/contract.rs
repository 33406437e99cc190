//! Registration-time checks on handler request and response types.
//!
//! The handler shape itself (two inputs, a [`Context`](super::Context) first,
//! a `Result` out whose error is a `std::error::Error`) is enforced by the
//! [`HandlerFn`](super::HandlerFn) bounds at compile time. What the type system
//! cannot express is checked here, once per request/response type pair:
//!
//! 1. the request type is an owned, named type;
//! 2. its name ends in [`REQUEST_SUFFIX`];
//! 3. the response type is an owned, named type;
//! 4. its name ends in [`RESPONSE_SUFFIX`].
//!
//! Results are cached for the life of the process.

use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Required suffix of request type names, as in `HelloReq`.
pub const REQUEST_SUFFIX: &str = "Req";

/// Required suffix of response type names, as in `HelloRes`.
pub const RESPONSE_SUFFIX: &str = "Res";

/// Validated metadata for one handler's request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    request_type: &'static str,
    response_type: &'static str,
}

/// A handler type pair that does not follow the contract.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    /// The request parameter is a reference, tuple, slice, or pointer.
    #[error("request parameter should be an owned named type, found `{0}`")]
    RequestNotOwned(&'static str),

    /// The request type's name lacks the `Req` suffix.
    #[error("request parameter should end with 'Req', found `{0}`")]
    RequestSuffix(&'static str),

    /// The response is a reference, tuple, slice, or pointer.
    #[error("response value should be an owned named type, found `{0}`")]
    ResponseNotOwned(&'static str),

    /// The response type's name lacks the `Res` suffix.
    #[error("response value should end with 'Res', found `{0}`")]
    ResponseSuffix(&'static str),
}

type Cache = RwLock<HashMap<(TypeId, TypeId), Result<Contract, ContractViolation>>>;

fn cache() -> &'static Cache {
    static CONTRACTS: OnceLock<Cache> = OnceLock::new();
    CONTRACTS.get_or_init(|| RwLock::new(HashMap::new()))
}

impl Contract {
    /// Checks `Req`/`Res`, computing the result at most once per pair.
    pub fn of<Req: 'static, Res: 'static>() -> Result<Contract, ContractViolation> {
        let key = (TypeId::of::<Req>(), TypeId::of::<Res>());
        if let Some(cached) = cache().read().get(&key) {
            return cached.clone();
        }

        cache()
            .write()
            .entry(key)
            .or_insert_with(|| check(type_name::<Req>(), type_name::<Res>()))
            .clone()
    }

    /// Full type name of the request parameter.
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Full type name of the response value.
    pub fn response_type(&self) -> &'static str {
        self.response_type
    }
}

/// Runs the contract checks on raw type names.
///
/// # Examples
///
/// ```
/// use skein::server::{check_contract, ContractViolation};
///
/// assert!(check_contract("api::v1::HelloReq", "api::v1::HelloRes").is_ok());
/// assert_eq!(
///     check_contract("api::v1::Hello", "api::v1::HelloRes"),
///     Err(ContractViolation::RequestSuffix("api::v1::Hello"))
/// );
/// ```
pub fn check(request: &'static str, response: &'static str) -> Result<Contract, ContractViolation> {
    let request_name = simple_name(request).ok_or(ContractViolation::RequestNotOwned(request))?;
    if !request_name.ends_with(REQUEST_SUFFIX) {
        return Err(ContractViolation::RequestSuffix(request));
    }

    let response_name =
        simple_name(response).ok_or(ContractViolation::ResponseNotOwned(response))?;
    if !response_name.ends_with(RESPONSE_SUFFIX) {
        return Err(ContractViolation::ResponseSuffix(response));
    }

    Ok(Contract {
        request_type: request,
        response_type: response,
    })
}

/// `a::b::Name<T>` -> `Name`; `None` for references, tuples, slices, arrays, pointers.
///
/// `type_name` output is documented as unstable. This assumes the shape current
/// compilers print: a `::`-separated path with generics in `<..>`, and
/// references, tuples, slices, arrays, raw pointers and trait objects led by
/// `&`, `(`, `[`, `*` or `dyn `. `test_type_name_shape_is_as_parsed` pins it.
fn simple_name(full: &str) -> Option<&str> {
    if full.starts_with(['&', '(', '[', '*']) || full.starts_with("dyn ") {
        return None;
    }
    let path = full.split('<').next()?;
    let name = path.rsplit("::").next()?;
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CreateUserReq;
    struct CreateUserRes;
    struct CreateUser;
    struct Wrapper<T>(T);

    #[test]
    fn test_well_named_pair_passes() {
        let contract = Contract::of::<CreateUserReq, CreateUserRes>().unwrap();
        assert!(contract.request_type().ends_with("CreateUserReq"));
        assert!(contract.response_type().ends_with("CreateUserRes"));
    }

    #[test]
    fn test_request_suffix_is_enforced() {
        assert!(matches!(
            Contract::of::<CreateUser, CreateUserRes>(),
            Err(ContractViolation::RequestSuffix(_))
        ));
    }

    #[test]
    fn test_response_suffix_is_enforced() {
        assert!(matches!(
            Contract::of::<CreateUserReq, CreateUser>(),
            Err(ContractViolation::ResponseSuffix(_))
        ));
    }

    #[test]
    fn test_references_and_tuples_are_rejected() {
        assert!(matches!(
            Contract::of::<&'static CreateUserReq, CreateUserRes>(),
            Err(ContractViolation::RequestNotOwned(_))
        ));
        assert!(matches!(
            Contract::of::<CreateUserReq, (CreateUserRes, u8)>(),
            Err(ContractViolation::ResponseNotOwned(_))
        ));
    }

    #[test]
    fn test_request_is_checked_before_response() {
        assert!(matches!(
            Contract::of::<CreateUser, CreateUser>(),
            Err(ContractViolation::RequestSuffix(_))
        ));
    }

    #[test]
    fn test_generic_wrapper_name_is_the_outer_type() {
        assert!(matches!(
            Contract::of::<Wrapper<CreateUserReq>, CreateUserRes>(),
            Err(ContractViolation::RequestSuffix(_))
        ));
    }

    #[test]
    fn test_type_name_shape_is_as_parsed() {
        assert!(type_name::<CreateUserReq>().ends_with("::CreateUserReq"));
        assert!(type_name::<Wrapper<CreateUserReq>>().contains("::Wrapper<"));
        assert!(type_name::<&CreateUserReq>().starts_with('&'));
        assert!(type_name::<(CreateUserReq, u8)>().starts_with('('));
        assert!(type_name::<[CreateUserReq]>().starts_with('['));
        assert!(type_name::<*const CreateUserReq>().starts_with('*'));
        assert!(type_name::<dyn std::any::Any>().starts_with("dyn "));

        assert_eq!(simple_name(type_name::<CreateUserReq>()), Some("CreateUserReq"));
        assert_eq!(simple_name(type_name::<Wrapper<CreateUserReq>>()), Some("Wrapper"));
        assert_eq!(simple_name(type_name::<[CreateUserReq; 2]>()), None);
    }

    #[test]
    fn test_results_are_cached() {
        let first = Contract::of::<CreateUserReq, CreateUserRes>();
        let second = Contract::of::<CreateUserReq, CreateUserRes>();
        assert_eq!(first, second);
        assert!(cache()
            .read()
            .contains_key(&(TypeId::of::<CreateUserReq>(), TypeId::of::<CreateUserRes>())));
    }
}
