use bytes::{Bytes, BytesMut};
use futures::stream::Stream;
use memchr::memmem;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Buffered reader over the source byte stream.
///
/// Every suspension point of the parser funnels through
/// [`poll_stream`](StreamBuffer::poll_stream); the rest of the interface
/// operates on already-buffered bytes and never blocks.
pub(crate) struct StreamBuffer<S> {
    pub(crate) eof: bool,
    pub(crate) buf: BytesMut,
    pub(crate) stream: S,
    consumed: u64,
}

impl<S: Stream<Item = Result<Bytes, crate::Error>> + Send + Sync + Unpin + 'static> StreamBuffer<S> {
    pub fn new(stream: S) -> Self {
        StreamBuffer {
            eof: false,
            buf: BytesMut::new(),
            stream,
            consumed: 0,
        }
    }

    /// Drains everything the source has ready into the buffer.
    pub fn poll_stream(&mut self, cx: &mut Context) -> Result<(), crate::Error> {
        if self.eof {
            return Ok(());
        }

        loop {
            match Pin::new(&mut self.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => self.buf.extend_from_slice(&data),
                Poll::Ready(Some(Err(err))) => return Err(err),
                Poll::Ready(None) => {
                    self.eof = true;
                    return Ok(());
                }
                Poll::Pending => return Ok(()),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bounded lookahead: a view of the next `n` bytes, without consuming.
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        if self.buf.len() >= n {
            Some(&self.buf[..n])
        } else {
            None
        }
    }

    /// Locates `delim` in the buffered bytes.
    pub fn find(&self, delim: &[u8]) -> Option<usize> {
        memmem::find(&self.buf, delim)
    }

    /// Consumes `n` buffered bytes.
    pub fn take(&mut self, n: usize) -> Bytes {
        self.consumed += n as u64;
        self.buf.split_to(n).freeze()
    }

    /// Discards `n` buffered bytes.
    pub fn skip(&mut self, n: usize) {
        self.consumed += n as u64;
        drop(self.buf.split_to(n));
    }

    /// Consumes exactly `delim`. `None` means more input is needed,
    /// `Some(false)` that the buffered bytes do not match.
    pub fn try_skip(&mut self, delim: &[u8]) -> Option<bool> {
        if self.buf.len() < delim.len() {
            return None;
        }
        if &self.buf[..delim.len()] != delim {
            return Some(false);
        }
        self.skip(delim.len());
        Some(true)
    }

    /// Monotonic count of bytes consumed from the source.
    pub fn total_bytes_read(&self) -> u64 {
        self.consumed
    }
}
