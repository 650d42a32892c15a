use crate::constants;
use bytes::{Bytes, BytesMut};

/// A multipart boundary token: `CRLF "--" value`.
///
/// Two views of the token are used while scanning. [`full`](Boundary::full)
/// keeps the leading CRLF and separates parts; [`first`](Boundary::first)
/// drops it so the very first boundary matches a stream that begins
/// directly with `--value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Boundary {
    token: Bytes,
}

impl Boundary {
    /// Extracts the boundary from a raw `Content-Type` header value.
    ///
    /// The parameter name matches ASCII-case-insensitively; the value may
    /// be quoted, with `\` escaping the next character. Values longer
    /// than 70 bytes, empty values and bytes outside the 7-bit range are
    /// rejected.
    pub fn parse<T: AsRef<str>>(content_type: T) -> crate::Result<Boundary> {
        let value = content_type.as_ref().as_bytes();
        let offset = find_boundary_param(value).ok_or(crate::Error::MissingBoundary)?;
        copy_boundary_value(&value[offset..])
    }

    /// Builds a token from an already-extracted boundary value, applying
    /// the same length and 7-bit validation as [`parse`](Boundary::parse).
    pub fn from_value<T: AsRef<str>>(value: T) -> crate::Result<Boundary> {
        let mut token = token_prefix();
        for &ch in value.as_ref().as_bytes() {
            push_value_byte(&mut token, ch)?;
        }
        finish_token(token)
    }

    /// The boundary value without the `CRLF --` prefix.
    pub fn value(&self) -> &[u8] {
        &self.token[4..]
    }

    /// The full token, `CRLF -- value`, used between parts.
    pub(crate) fn full(&self) -> Bytes {
        self.token.clone()
    }

    /// The token without its leading CRLF, used at stream start.
    pub(crate) fn first(&self) -> Bytes {
        self.token.slice(2..)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    HeaderValue,
    ParamName,
    ParamValueUnquoted,
    ParamValueQuoted,
    QuotedEscape,
}

/// First pass: walk the header value and return the offset just past
/// `boundary=`.
///
/// A comma selects the next alternative `Content-Type`, dropping back to
/// the header-value state; a parameter only matches while no significant
/// name character has been consumed yet.
fn find_boundary_param(value: &[u8]) -> Option<usize> {
    let param = constants::BOUNDARY_PARAM.as_bytes();
    let mut state = State::HeaderValue;
    let mut name_len = 0usize;

    for (i, &ch) in value.iter().enumerate() {
        match state {
            State::HeaderValue => {
                if ch == b';' {
                    state = State::ParamName;
                    name_len = 0;
                }
            }
            State::ParamName => {
                if name_len == 0
                    && value.len() - i >= param.len()
                    && value[i..i + param.len()].eq_ignore_ascii_case(param)
                {
                    return Some(i + param.len());
                }
                match ch {
                    b'=' => state = State::ParamValueUnquoted,
                    b';' => name_len = 0,
                    b',' => state = State::HeaderValue,
                    b' ' => {}
                    _ => name_len += 1,
                }
            }
            State::ParamValueUnquoted => match ch {
                b'"' => state = State::ParamValueQuoted,
                b';' => {
                    state = State::ParamName;
                    name_len = 0;
                }
                b',' => state = State::HeaderValue,
                _ => {}
            },
            State::ParamValueQuoted => match ch {
                b'"' => state = State::HeaderValue,
                b'\\' => state = State::QuotedEscape,
                _ => {}
            },
            State::QuotedEscape => state = State::ParamValueQuoted,
        }
    }

    None
}

/// Second pass: copy the located value into a fresh token buffer.
fn copy_boundary_value(value: &[u8]) -> crate::Result<Boundary> {
    let mut token = token_prefix();
    let mut i = 0;

    while i < value.len() && value[i] == b' ' {
        i += 1;
    }

    if i < value.len() && value[i] == b'"' {
        i += 1;
        while i < value.len() {
            match value[i] {
                b'\\' if i + 1 < value.len() => {
                    push_value_byte(&mut token, value[i + 1])?;
                    i += 2;
                }
                b'"' => break,
                ch => {
                    push_value_byte(&mut token, ch)?;
                    i += 1;
                }
            }
        }
    } else {
        while i < value.len() {
            match value[i] {
                b' ' | b',' | b';' | b'\r' | b'\n' => break,
                ch => {
                    push_value_byte(&mut token, ch)?;
                    i += 1;
                }
            }
        }
    }

    finish_token(token)
}

fn token_prefix() -> BytesMut {
    let mut token = BytesMut::with_capacity(constants::MAX_BOUNDARY_TOKEN_LEN);
    token.extend_from_slice(constants::CRLF.as_bytes());
    token.extend_from_slice(constants::BOUNDARY_EXT.as_bytes());
    token
}

fn push_value_byte(token: &mut BytesMut, ch: u8) -> crate::Result<()> {
    if ch > 0x7F {
        return Err(crate::Error::BoundaryNon7Bit);
    }
    if token.len() == constants::MAX_BOUNDARY_TOKEN_LEN {
        return Err(crate::Error::BoundaryTooLong);
    }
    token.extend_from_slice(&[ch]);
    Ok(())
}

fn finish_token(token: BytesMut) -> crate::Result<Boundary> {
    if token.len() == 4 {
        return Err(crate::Error::BoundaryEmpty);
    }
    Ok(Boundary {
        token: token.freeze(),
    })
}
