use crate::{constants, Error};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use httparse::Header;
use std::convert::TryFrom;

/// Parses a complete header block, terminated by an empty line, into a
/// header map. Order and multi-valued names are preserved.
pub(crate) fn parse_header_block(block: &[u8]) -> crate::Result<HeaderMap> {
    let mut raw = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

    match httparse::parse_headers(block, &mut raw) {
        Ok(httparse::Status::Complete((_, raw_headers))) => {
            convert_raw_headers_to_header_map(raw_headers)
        }
        Ok(httparse::Status::Partial) => Err(Error::MalformedHeaders {
            cause: "incomplete header block".to_owned(),
        }),
        Err(err) => Err(Error::MalformedHeaders {
            cause: err.to_string(),
        }),
    }
}

pub(crate) fn convert_raw_headers_to_header_map(raw_headers: &[Header<'_>]) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = HeaderName::try_from(raw_header.name).map_err(|err| Error::MalformedHeaders {
            cause: err.to_string(),
        })?;

        let value = HeaderValue::try_from(raw_header.value).map_err(|err| Error::MalformedHeaders {
            cause: err.to_string(),
        })?;

        headers.append(name, value);
    }

    Ok(headers)
}
