//! Turning request payloads into re-readable bytes.
//!
//! Every body is materialized into a [`Bytes`] buffer before the first attempt
//! so that each retry can wrap the very same bytes into a fresh transport body.
//! Readers are drained eagerly for the same reason.

use bytes::Bytes;
use serde::Serialize;
use std::io::{self, Read};

/// Content type used for bodies produced from [`Json`].
pub const APPLICATION_JSON: &str = "application/json";

/// Content type used for form-encoded bodies.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// A body payload fixed into memory, with an optional content-type hint.
///
/// `bytes` is `None` when materialization failed; the request is still
/// usable, it just carries no body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialized {
    /// The payload bytes, if materialization succeeded.
    pub bytes: Option<Bytes>,
    /// Content type implied by the payload kind, if any.
    pub content_type: Option<&'static str>,
}

impl Materialized {
    fn raw(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            content_type: None,
        }
    }
}

/// Conversion of a caller value into a [`Materialized`] body.
///
/// Text and byte inputs are copied as-is with no content-type inference.
/// Use [`Json`] for structured values. Streams go through [`Reader::drain`].
pub trait IntoBody {
    /// Fixes the value into bytes.
    fn materialize(self) -> Materialized;
}

impl IntoBody for String {
    fn materialize(self) -> Materialized {
        Materialized::raw(self)
    }
}

impl IntoBody for &str {
    fn materialize(self) -> Materialized {
        Materialized::raw(Bytes::copy_from_slice(self.as_bytes()))
    }
}

impl IntoBody for Vec<u8> {
    fn materialize(self) -> Materialized {
        Materialized::raw(self)
    }
}

impl IntoBody for &[u8] {
    fn materialize(self) -> Materialized {
        Materialized::raw(Bytes::copy_from_slice(self))
    }
}

impl IntoBody for Bytes {
    fn materialize(self) -> Materialized {
        Materialized::raw(self)
    }
}

/// A structured value sent as a JSON body.
///
/// Serialization failures are logged and leave the body unset rather than
/// failing the request.
///
/// # Examples
///
/// ```
/// use skein::body::{IntoBody, Json, APPLICATION_JSON};
///
/// let body = Json(&serde_json::json!({ "name": "alice" })).materialize();
/// assert_eq!(body.content_type, Some(APPLICATION_JSON));
/// assert_eq!(body.bytes.as_deref(), Some(&br#"{"name":"alice"}"#[..]));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoBody for Json<T> {
    fn materialize(self) -> Materialized {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Materialized {
                bytes: Some(Bytes::from(bytes)),
                content_type: Some(APPLICATION_JSON),
            },
            Err(e) => {
                tracing::error!(error = %e, "JSON marshal of request body failed, sending without body");
                Materialized::default()
            }
        }
    }
}

/// A stream drained into memory as soon as it is attached to a request.
///
/// Unlike [`Json`], a failed read is an error: bytes already read would be
/// lost and the request would go out with a truncated body.
///
/// # Examples
///
/// ```
/// use skein::body::Reader;
/// use std::io::Cursor;
///
/// let body = Reader(Cursor::new(b"chunk".to_vec())).drain().unwrap();
/// assert_eq!(body.bytes.as_deref(), Some(&b"chunk"[..]));
/// ```
#[derive(Debug)]
pub struct Reader<R>(pub R);

impl<R: Read> Reader<R> {
    /// Reads the stream to the end.
    ///
    /// # Errors
    ///
    /// Returns the first read error; nothing read before it is kept.
    pub fn drain(mut self) -> io::Result<Materialized> {
        let mut buf = Vec::new();
        self.0.read_to_end(&mut buf)?;
        Ok(Materialized::raw(buf))
    }
}
