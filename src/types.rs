//! Types module for the main runtime, exposing error and result types.
//!
//! Most code in this module is based around coercion of error types into
//! a common error type, to be used as the general "Error" of this crate.
use logger::SetLoggerError;
use quick_xml::events::Event;
use quick_xml::Reader;
use rusoto_core::{request, RusotoError};

use std::fmt::{self, Debug, Display, Formatter};
use std::{io, num, path};

/// Public type alias for a result with a `UtilError` error type.
pub type UtilResult<T> = Result<T, UtilError>;

/// Delegating error wrapper for errors raised by the main archive.
///
/// The internal `String` representation enables cheap coercion from
/// other error types by binding their error messages through. This
/// is somewhat similar to the `failure` crate, but minimal.
///
/// Errors which can't succeed on a second attempt (missing files, denied
/// access, rejected requests) are flagged as permanent, so retries can
/// give up on them straight away.
pub struct UtilError {
    message: String,
    permanent: bool,
}

impl UtilError {
    /// Creates a new (retryable) `UtilError` from a message.
    fn new(message: String) -> Self {
        Self {
            message,
            permanent: false,
        }
    }

    /// Determines whether retrying the failed operation is pointless.
    pub fn is_permanent(&self) -> bool {
        self.permanent
    }
}

/// Debug implementation for `UtilError`.
impl Debug for UtilError {
    /// Formats an `UtilError` by delegating to `Display`.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Display implementation for `UtilError`.
impl Display for UtilError {
    /// Formats an `UtilError` by writing out the inner representation.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Macro to implement `From` for provided types.
macro_rules! derive_from {
    ($type:ty) => {
        impl<'a> From<$type> for UtilError {
            fn from(t: $type) -> UtilError {
                UtilError::new(t.to_string())
            }
        }
    };
}

// Easy derivations of derive_from.
derive_from!(&'a str);
derive_from!(clap::Error);
derive_from!(SetLoggerError);
derive_from!(regex::Error);
derive_from!(reqwest::Error);
derive_from!(serde_json::Error);
derive_from!(request::TlsError);
derive_from!(num::ParseIntError);
derive_from!(path::StripPrefixError);
derive_from!(String);

impl From<io::Error> for UtilError {
    /// Converts an IO error, marking missing or forbidden paths as permanent.
    fn from(err: io::Error) -> UtilError {
        let permanent = match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => true,
            _ => false,
        };

        UtilError {
            message: err.to_string(),
            permanent,
        }
    }
}

/// Macro to implement `From` for Rusoto types.
macro_rules! derive_from_rusoto {
    ($type:ty) => {
        impl From<RusotoError<$type>> for UtilError {
            /// Converts a Rusoto error to a `UtilError`.
            fn from(err: RusotoError<$type>) -> UtilError {
                UtilError {
                    permanent: is_permanent(&err),
                    message: extract_message(err.to_string()),
                }
            }
        }
    };
}

// derive error display for all used rusoto_s3 types
derive_from_rusoto!(rusoto_s3::AbortMultipartUploadError);
derive_from_rusoto!(rusoto_s3::CompleteMultipartUploadError);
derive_from_rusoto!(rusoto_s3::CreateMultipartUploadError);
derive_from_rusoto!(rusoto_s3::GetObjectError);
derive_from_rusoto!(rusoto_s3::HeadObjectError);
derive_from_rusoto!(rusoto_s3::ListObjectsV2Error);
derive_from_rusoto!(rusoto_s3::PutObjectError);
derive_from_rusoto!(rusoto_s3::UploadPartError);

/// Determines whether a Rusoto error is a rejection rather than a fault.
///
/// Modeled service errors and validation failures are rejections, as are
/// raw 4xx responses (such as `AccessDenied`) apart from timeouts and
/// throttling. Dispatch failures and 5xx responses remain retryable.
fn is_permanent<E>(err: &RusotoError<E>) -> bool {
    match err {
        RusotoError::Service(_) | RusotoError::Validation(_) => true,
        RusotoError::Unknown(response) => {
            let status = response.status.as_u16();
            response.status.is_client_error() && status != 408 && status != 429
        }
        _ => false,
    }
}

/// Pulls the `<Message>` out of an XML error body, if there is one.
///
/// S3 compatible services (MinIO in particular) return their errors as
/// raw XML documents, which makes for unreadable logs if passed through.
fn extract_message(msg: String) -> String {
    // XML, look for a message!
    if !msg.starts_with("<?xml") {
        return msg;
    }

    // create an XML reader and buffer
    let mut reader = Reader::from_str(&msg);
    let mut buffer = Vec::new();

    loop {
        // parse through each XML node event
        match reader.read_event(&mut buffer) {
            // end, or error, just give up
            Ok(Event::Eof) | Err(_) => break,

            // if we find a message tag, we'll use that as the error
            Ok(Event::Start(ref e)) if e.name() == b"Message" => {
                if let Ok(text) = reader.read_text(b"Message", &mut Vec::new()) {
                    return text;
                }
                break;
            }

            // skip
            _ => (),
        }
        // empty buffers
        buffer.clear();
    }

    // default msg
    msg
}
