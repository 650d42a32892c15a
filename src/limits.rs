use crate::constants;

/// Size caps applied while parsing a multipart stream.
///
/// The defaults follow the documented wire limits: 8192 bytes of
/// preamble, 8192 bytes of boundary-line padding, and an unlimited part
/// body. A part that carries its own `Content-Length` is additionally
/// checked against the part cap before any of its body is copied.
pub struct Limits {
    pub(crate) preamble_size: usize,
    pub(crate) boundary_line: usize,
    pub(crate) part_size: u64,
}

impl Limits {
    /// Creates the default limits.
    pub fn new() -> Limits {
        Limits::default()
    }

    /// Caps the bytes tolerated before the first boundary.
    pub fn preamble_size(mut self, limit: usize) -> Limits {
        self.preamble_size = limit;
        self
    }

    /// Caps the trailing characters tolerated on a boundary line.
    pub fn boundary_line(mut self, limit: usize) -> Limits {
        self.boundary_line = limit;
        self
    }

    /// Caps each part body, whether boundary- or `Content-Length`-delimited.
    pub fn part_size(mut self, limit: u64) -> Limits {
        self.part_size = limit;
        self
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            preamble_size: constants::DEFAULT_PREAMBLE_SIZE_LIMIT,
            boundary_line: constants::DEFAULT_BOUNDARY_LINE_LIMIT,
            part_size: constants::DEFAULT_PART_SIZE_LIMIT,
        }
    }
}
