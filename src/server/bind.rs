//! Binding inbound request data into typed request values.
//!
//! The source is picked from the request's content type: JSON bodies and
//! urlencoded forms are decoded from the body, everything else from the query
//! string. A decoded value is then checked with [`Validate`], which reports
//! field failures in a stable order.

use serde::de::DeserializeOwned;
use std::fmt;

/// The raw parts of an inbound request that binding reads from.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindSource<'a> {
    /// The raw query string, without the leading `?`.
    pub query: Option<&'a str>,
    /// The `Content-Type` header value.
    pub content_type: Option<&'a str>,
    /// The full request body.
    pub body: &'a [u8],
}

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The offending field.
    pub field: String,
    /// A caller-facing description of the problem.
    pub message: String,
}

/// Ordered collection of field failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// The first recorded failure.
    pub fn first(&self) -> Option<&FieldError> {
        self.0.first()
    }

    /// All failures in the order they were recorded.
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when empty, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Field-level rules checked after a request value has been decoded.
///
/// The default accepts everything.
///
/// # Examples
///
/// ```
/// use skein::server::{Validate, ValidationErrors};
///
/// struct SignupReq {
///     name: String,
///     age: u32,
/// }
///
/// impl Validate for SignupReq {
///     fn validate(&self) -> Result<(), ValidationErrors> {
///         let mut errors = ValidationErrors::new();
///         if self.name.is_empty() {
///             errors.add("name", "name is required");
///         }
///         if self.age < 18 {
///             errors.add("age", "age must be at least 18");
///         }
///         errors.into_result()
///     }
/// }
/// ```
pub trait Validate {
    /// Checks the value, reporting every failing field in a stable order.
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Why binding failed.
#[derive(thiserror::Error, Debug)]
pub enum BindError {
    /// The query string did not match the request type.
    #[error("invalid query parameters: {0}")]
    Query(#[source] serde_urlencoded::de::Error),

    /// The form body did not match the request type.
    #[error("invalid form body: {0}")]
    Form(#[source] serde_urlencoded::de::Error),

    /// The JSON body did not match the request type.
    #[error("invalid JSON body: {0}")]
    Json(#[source] serde_json::Error),

    /// The body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// The value decoded but broke field rules.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
}

/// Decodes and validates a `T` from `source`.
///
/// # Examples
///
/// ```
/// use serde::Deserialize;
/// use skein::server::{bind, BindSource, Validate};
///
/// #[derive(Deserialize)]
/// struct HelloReq {
///     name: String,
/// }
///
/// impl Validate for HelloReq {}
///
/// let req: HelloReq = bind(&BindSource {
///     query: Some("name=world"),
///     ..Default::default()
/// })
/// .unwrap();
/// assert_eq!(req.name, "world");
/// ```
pub fn bind<T>(source: &BindSource<'_>) -> Result<T, BindError>
where
    T: DeserializeOwned + Validate,
{
    let value: T = match media_type(source.content_type) {
        Some(mime) if is_json(&mime) && !source.body.is_empty() => {
            serde_json::from_slice(source.body).map_err(BindError::Json)?
        }
        Some(mime) if mime == "application/x-www-form-urlencoded" => {
            serde_urlencoded::from_bytes(source.body).map_err(BindError::Form)?
        }
        _ => serde_urlencoded::from_str(source.query.unwrap_or_default())
            .map_err(BindError::Query)?,
    };

    value.validate().map_err(BindError::Validation)?;
    Ok(value)
}

fn media_type(content_type: Option<&str>) -> Option<String> {
    let essence = content_type?.split(';').next()?.trim();
    Some(essence.to_ascii_lowercase())
}

fn is_json(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct SearchReq {
        term: String,
        #[serde(default)]
        page: u32,
    }

    impl Validate for SearchReq {
        fn validate(&self) -> Result<(), ValidationErrors> {
            let mut errors = ValidationErrors::new();
            if self.term.len() < 2 {
                errors.add("term", "term must be at least 2 characters");
            }
            if self.page > 100 {
                errors.add("page", "page must not exceed 100");
            }
            errors.into_result()
        }
    }

    #[test]
    fn test_binds_query_string() {
        let req: SearchReq = bind(&BindSource {
            query: Some("term=rust&page=3"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            req,
            SearchReq {
                term: "rust".to_string(),
                page: 3
            }
        );
    }

    #[test]
    fn test_binds_json_body() {
        let req: SearchReq = bind(&BindSource {
            query: Some("term=ignored"),
            content_type: Some("application/json; charset=utf-8"),
            body: br#"{"term":"axum","page":1}"#,
        })
        .unwrap();
        assert_eq!(req.term, "axum");
    }

    #[test]
    fn test_binds_form_body() {
        let req: SearchReq = bind(&BindSource {
            content_type: Some("application/x-www-form-urlencoded"),
            body: b"term=tokio+runtime",
            ..Default::default()
        })
        .unwrap();
        assert_eq!(req.term, "tokio runtime");
    }

    #[test]
    fn test_malformed_json_is_not_a_validation_failure() {
        let result = bind::<SearchReq>(&BindSource {
            content_type: Some("application/json"),
            body: b"{not json",
            ..Default::default()
        });
        assert!(matches!(result, Err(BindError::Json(_))));
    }

    #[test]
    fn test_validation_failures_keep_order() {
        let result = bind::<SearchReq>(&BindSource {
            query: Some("term=x&page=500"),
            ..Default::default()
        });

        match result {
            Err(BindError::Validation(errors)) => {
                let fields: Vec<&str> = errors.errors().iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["term", "page"]);
                assert_eq!(
                    errors.first().unwrap().message,
                    "term must be at least 2 characters"
                );
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }
}
