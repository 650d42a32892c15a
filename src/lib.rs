//! An async streaming event parser for `multipart/*` message bodies in Rust.
//!
//! It accepts a [`Stream`](https://docs.rs/futures/0.3/futures/stream/trait.Stream.html) of [`Bytes`](https://docs.rs/bytes/1/bytes/struct.Bytes.html) as
//! a source and produces a lazy, ordered sequence of multipart events — an
//! optional preamble, the parts with their headers and body substreams, and
//! an optional epilogue — without ever materializing the whole body in memory.
//!
//! # Examples
//!
//! ```no_run
//! use bytes::Bytes;
//! use futures::stream;
//! use partstream::MultipartEvent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Generate a byte stream and the content type from somewhere e.g. a server request.
//!     let body = "--X-BOUNDARY\r\nContent-Type: text/plain\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//!     let stream = stream::iter(vec![partstream::Result::Ok(Bytes::from(body))]);
//!     let content_type = "multipart/form-data; boundary=X-BOUNDARY";
//!
//!     // Create the event stream and pull events one by one.
//!     let mut events = partstream::parse_multipart(stream, content_type, None)?;
//!
//!     while let Some(event) = events.next_event().await? {
//!         match event {
//!             MultipartEvent::Preamble(bytes) => println!("preamble: {} bytes", bytes.len()),
//!             MultipartEvent::Part(mut part) => {
//!                 // Headers resolve before the first body byte.
//!                 let headers = part.headers().await?;
//!                 println!("part headers: {:?}", headers);
//!
//!                 // Process the body chunks e.g. store them in a file.
//!                 while let Some(chunk) = part.chunk().await? {
//!                     println!("chunk: {} bytes", chunk.len());
//!                 }
//!             }
//!             MultipartEvent::Epilogue(bytes) => println!("epilogue: {} bytes", bytes.len()),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub use boundary::Boundary;
pub use error::Error;
pub use event::MultipartEvent;
pub use limits::Limits;
pub use multipart::MultipartEvents;
pub use part::{Part, PartBody, PartHeaders};

mod boundary;
mod buffer;
mod constants;
mod error;
mod event;
mod helpers;
mod limits;
mod multipart;
mod part;
mod state;

/// A Result type often returned from methods that can have `partstream` errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses a `Content-Type` header value into a boundary token.
///
/// # Examples
///
/// ```
/// # fn run() {
/// let content_type = "multipart/form-data; boundary=ABCDEFG";
///
/// let boundary = partstream::parse_boundary(content_type).unwrap();
/// assert_eq!(boundary.value(), b"ABCDEFG");
/// # }
/// # run();
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<Boundary> {
    Boundary::parse(content_type)
}

/// Returns `true` iff the headers announce a `multipart/*` payload.
pub fn expect_multipart(headers: &http::HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .map(|m| m.type_() == mime::MULTIPART)
        .unwrap_or(false)
}

/// Starts parsing `stream` as the multipart body described by
/// `content_type`.
///
/// Fails with [`Error::NotMultipart`] unless the content type is a
/// `multipart/*` media type; the boundary is then extracted with
/// [`parse_boundary`]. `content_length`, when known, delimits the
/// epilogue.
pub fn parse_multipart<S>(
    stream: S,
    content_type: &str,
    content_length: Option<u64>,
) -> crate::Result<MultipartEvents<S>>
where
    S: futures::stream::Stream<Item = std::result::Result<bytes::Bytes, Error>>
        + Send
        + Sync
        + Unpin
        + 'static,
{
    let mime_type = content_type
        .parse::<mime::Mime>()
        .map_err(|_| Error::NotMultipart)?;
    if mime_type.type_() != mime::MULTIPART {
        return Err(Error::NotMultipart);
    }

    let boundary = Boundary::parse(content_type)?;
    Ok(MultipartEvents::new(stream, boundary, content_length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

    #[test]
    fn test_parse_boundary() {
        let content_type = "multipart/form-data; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type).unwrap().value(), b"ABCDEFG");

        let content_type = "multipart/form-data; boundary=------ABCDEFG";
        assert_eq!(
            parse_boundary(content_type).unwrap().value(),
            b"------ABCDEFG"
        );

        let content_type = "boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Err(Error::MissingBoundary));

        let content_type = "text/plain";
        assert_eq!(parse_boundary(content_type), Err(Error::MissingBoundary));
    }

    #[test]
    fn test_parse_boundary_is_idempotent() {
        let content_type = "multipart/mixed; boundary=\"a;b c\"";
        assert_eq!(
            parse_boundary(content_type).unwrap(),
            parse_boundary(content_type).unwrap()
        );
    }

    #[test]
    fn test_expect_multipart() {
        let mut headers = HeaderMap::new();
        assert!(!expect_multipart(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!expect_multipart(&headers));

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=ABCDEFG"),
        );
        assert!(expect_multipart(&headers));

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("multipart/mixed; boundary=x"),
        );
        assert!(expect_multipart(&headers));
    }
}
