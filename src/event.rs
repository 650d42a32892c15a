use crate::part::Part;
use bytes::Bytes;

/// A single event produced while parsing a multipart body.
///
/// Events arrive in source order: at most one `Preamble`, any number of
/// `Part`s, and at most one `Epilogue` (only when the total content
/// length was given).
pub enum MultipartEvent<S> {
    /// Raw bytes preceding the first boundary. Not emitted when empty.
    Preamble(Bytes),
    /// A part: headers future plus body substream.
    Part(Part<S>),
    /// Raw bytes following the closing boundary.
    Epilogue(Bytes),
}

impl<S> MultipartEvent<S> {
    /// Discards the event.
    ///
    /// A `Preamble` or `Epilogue` drops its buffer; a `Part` cancels an
    /// undelivered headers future and hands the unread body back to the
    /// parser to drain, so the event stream keeps moving. Dropping the
    /// event has the same effect, which makes releasing idempotent and
    /// safe after partial consumption.
    pub fn release(self) {}
}
