use derive_more::Display;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while parsing a multipart stream and
/// in other operations.
#[derive(Clone, Display)]
#[display(fmt = "partstream: {}")]
pub enum Error {
    /// The `Content-Type` header is missing or not a `multipart/*` media type.
    #[display(fmt = "The Content-Type is not a multipart media type")]
    NotMultipart,

    /// No `boundary` parameter found in the `Content-Type` header.
    #[display(fmt = "No boundary parameter found in the Content-Type header")]
    MissingBoundary,

    /// The boundary value contains a byte outside the 7-bit range.
    #[display(fmt = "The boundary value contains a non 7-bit character")]
    BoundaryNon7Bit,

    /// The boundary value is longer than 70 characters.
    #[display(fmt = "The boundary value is longer than 70 characters")]
    BoundaryTooLong,

    /// The boundary value is empty.
    #[display(fmt = "The boundary value is empty")]
    BoundaryEmpty,

    /// The stream ended before the parser expected it to.
    #[display(fmt = "Unexpected end of the multipart stream")]
    UnexpectedEof,

    /// A part header line violates the header grammar.
    #[display(fmt = "Malformed part headers: {}", cause)]
    MalformedHeaders { cause: String },

    /// Trailing characters after a boundary exceeded the scratch buffer.
    #[display(fmt = "The boundary line carries too many trailing characters")]
    BoundaryLineTooLong,

    /// A preamble, part body or epilogue exceeded its configured cap.
    #[display(fmt = "A size limit of {} bytes was exceeded", limit)]
    LimitExceeded { limit: u64 },

    /// The bytes following an exact-length part body are not the boundary token.
    #[display(fmt = "The stream is not a valid multipart body")]
    InvalidFormat,

    /// The consumer released the event or cancelled the stream.
    #[display(fmt = "Multipart processing has been cancelled")]
    Cancelled,

    /// The underlying byte stream failed.
    #[display(fmt = "Stream read failed: {}", _0)]
    StreamReadFailed(Arc<BoxError>),

    /// Failed to lock the shared multipart state.
    #[display(fmt = "Couldn't lock the multipart state")]
    LockFailure,

    #[doc(hidden)]
    __Nonexhaustive,
}

impl Error {
    /// Wraps an upstream failure so it can travel through the event stream.
    pub fn stream<E: Into<BoxError>>(err: E) -> Error {
        Error::StreamReadFailed(Arc::new(err.into()))
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}
