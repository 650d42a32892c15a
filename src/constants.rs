pub(crate) const MAX_HEADERS: usize = 32;

pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CRLF_CRLF: &str = "\r\n\r\n";
pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const BOUNDARY_PARAM: &str = "boundary=";

/// Longest boundary value allowed by RFC 2046 §5.1.1.
pub(crate) const MAX_BOUNDARY_VALUE_LEN: usize = 70;
/// `CRLF "--" value`, so the value length plus four.
pub(crate) const MAX_BOUNDARY_TOKEN_LEN: usize = MAX_BOUNDARY_VALUE_LEN + 4;

pub(crate) const DEFAULT_PREAMBLE_SIZE_LIMIT: usize = 8192;
pub(crate) const DEFAULT_BOUNDARY_LINE_LIMIT: usize = 8192;
pub(crate) const DEFAULT_PART_SIZE_LIMIT: u64 = std::u64::MAX;

/// Largest epilogue the parser will materialize when the total body
/// length is known.
pub(crate) const MAX_EPILOGUE_SIZE: u64 = std::i32::MAX as u64;
