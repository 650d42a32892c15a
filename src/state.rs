use crate::boundary::Boundary;
use crate::buffer::StreamBuffer;
use crate::limits::Limits;
use crate::{constants, helpers, Error};
use bytes::Bytes;
use futures::stream::Stream;
use http::header::{self, HeaderMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Waker};

/// Parser stage. Exactly one stage is active at a time and every
/// transition happens under the state lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Scanning for the first boundary token.
    Preamble,
    /// The boundary token has been consumed; deciding open vs closing.
    BoundarySuffix,
    /// Consuming transport padding through the boundary line's CRLF.
    BoundaryLine,
    /// A part has been emitted; its header block is not yet parsed.
    PartHeaders,
    /// The part's body is streaming.
    PartBody,
    Epilogue,
    End,
}

/// Per-part rendezvous between the parser and the part handles.
///
/// Lock order is always state first, slot second.
pub(crate) struct PartShared {
    /// The parsed header block, waiting for the headers future to pick
    /// it up. Replaced by `Err(Cancelled)` when the part is released
    /// before delivery.
    pub(crate) headers: Option<crate::Result<HeaderMap>>,
    /// Terminal part error; body and headers handles both observe it.
    pub(crate) failed: Option<Error>,
    /// The body has been fully delivered and the boundary consumed.
    pub(crate) done: bool,
    /// The consumer gave the part up; the parser drains the body itself.
    pub(crate) released: bool,
    pub(crate) headers_waker: Option<Waker>,
    pub(crate) body_waker: Option<Waker>,
}

impl PartShared {
    pub(crate) fn new() -> PartShared {
        PartShared {
            headers: None,
            failed: None,
            done: false,
            released: false,
            headers_waker: None,
            body_waker: None,
        }
    }

    pub(crate) fn wake_all(&mut self) {
        if let Some(waker) = self.headers_waker.take() {
            waker.wake();
        }
        if let Some(waker) = self.body_waker.take() {
            waker.wake();
        }
    }
}

/// Progress of the current part body.
pub(crate) struct BodyProgress {
    /// Countdown when the part declared a `Content-Length`.
    pub(crate) remaining: Option<u64>,
    pub(crate) copied: u64,
    pub(crate) limit: u64,
}

impl BodyProgress {
    fn new(limit: u64) -> BodyProgress {
        BodyProgress {
            remaining: None,
            copied: 0,
            limit,
        }
    }
}

/// Outcome of one producer step.
pub(crate) enum Step {
    Again,
    Pending,
    Event(EventKind),
}

pub(crate) enum EventKind {
    Preamble(Bytes),
    Part(Arc<Mutex<PartShared>>),
    Epilogue(Bytes),
}

/// Outcome of a header-parsing step.
pub(crate) enum Drive {
    Again,
    Pending,
}

/// Outcome of a body step.
pub(crate) enum BodyStep {
    Chunk(Bytes),
    Done,
    Pending,
}

pub(crate) struct MultipartState<S> {
    pub(crate) buffer: StreamBuffer<S>,
    pub(crate) boundary: Boundary,
    pub(crate) limits: Limits,
    pub(crate) total_length: Option<u64>,
    pub(crate) stage: Stage,
    pub(crate) current: Option<Arc<Mutex<PartShared>>>,
    pub(crate) body: BodyProgress,
    pub(crate) error: Option<Error>,
    pub(crate) error_emitted: bool,
    pub(crate) event_waker: Option<Waker>,
}

impl<S> MultipartState<S> {
    /// Marks the whole stream failed and attaches the cause to the
    /// in-flight part, so its handles observe the error too.
    pub(crate) fn fail(&mut self, err: Error) {
        if let Some(slot) = self.current.take() {
            if let Ok(mut part) = slot.lock() {
                if part.headers.is_none() {
                    part.headers = Some(Err(err.clone()));
                }
                part.failed = Some(err.clone());
                part.wake_all();
            }
        }
        self.error = Some(err);
        self.stage = Stage::End;
        self.wake_event();
    }

    pub(crate) fn wake_event(&mut self) {
        if let Some(waker) = self.event_waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn is_current(&self, slot: &Arc<Mutex<PartShared>>) -> bool {
        self.current
            .as_ref()
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
    }
}

impl<S: Stream<Item = Result<Bytes, Error>> + Send + Sync + Unpin + 'static> MultipartState<S> {
    pub(crate) fn new(
        stream: S,
        boundary: Boundary,
        total_length: Option<u64>,
        limits: Limits,
    ) -> Self {
        let part_size = limits.part_size;
        MultipartState {
            buffer: StreamBuffer::new(stream),
            boundary,
            limits,
            total_length,
            stage: Stage::Preamble,
            current: None,
            body: BodyProgress::new(part_size),
            error: None,
            error_emitted: false,
            event_waker: None,
        }
    }

    /// Scans for the first boundary token, which carries no leading CRLF
    /// because the stream may begin directly with `--boundary`.
    pub(crate) fn step_preamble(&mut self, cx: &mut Context) -> crate::Result<Step> {
        self.buffer.poll_stream(cx)?;

        let first = self.boundary.first();
        let limit = self.limits.preamble_size;

        match self.buffer.find(&first) {
            Some(idx) => {
                if idx > limit {
                    return Err(Error::LimitExceeded { limit: limit as u64 });
                }
                let preamble = self.buffer.take(idx);
                self.buffer.skip(first.len());
                self.stage = Stage::BoundarySuffix;
                if preamble.is_empty() {
                    Ok(Step::Again)
                } else {
                    Ok(Step::Event(EventKind::Preamble(preamble)))
                }
            }
            None => {
                // a token prefix may still be forming at the buffer tail
                let settled = self.buffer.len().saturating_sub(first.len() - 1);
                if settled > limit {
                    return Err(Error::LimitExceeded { limit: limit as u64 });
                }
                if self.buffer.eof {
                    return Err(Error::UnexpectedEof);
                }
                Ok(Step::Pending)
            }
        }
    }

    /// Decides between an open (CRLF) and a closing (`--`) boundary.
    ///
    /// The closing probe inspects the suffix twice, one byte and then
    /// two; a lone `-` that is not part of the closing pair falls through
    /// to the boundary-line padding.
    pub(crate) fn step_boundary_suffix(&mut self, cx: &mut Context) -> crate::Result<Step> {
        self.buffer.poll_stream(cx)?;

        let first = match self.buffer.peek(1) {
            Some(bytes) => bytes[0],
            None => {
                return if self.buffer.eof {
                    Err(Error::UnexpectedEof)
                } else {
                    Ok(Step::Pending)
                };
            }
        };

        if first != b'-' {
            self.stage = Stage::BoundaryLine;
            return Ok(Step::Again);
        }

        match self.buffer.peek(2) {
            Some(bytes) if bytes[1] == b'-' => {
                self.buffer.skip(2);
                self.stage = Stage::Epilogue;
                Ok(Step::Again)
            }
            Some(_) => {
                self.stage = Stage::BoundaryLine;
                Ok(Step::Again)
            }
            None => {
                if self.buffer.eof {
                    Err(Error::UnexpectedEof)
                } else {
                    Ok(Step::Pending)
                }
            }
        }
    }

    /// Consumes boundary-line padding through the next CRLF, then opens
    /// a fresh part and emits its event before any header byte is read.
    pub(crate) fn step_boundary_line(&mut self, cx: &mut Context) -> crate::Result<Step> {
        self.buffer.poll_stream(cx)?;

        let limit = self.limits.boundary_line;
        match self.buffer.find(constants::CRLF.as_bytes()) {
            Some(idx) => {
                if idx + 2 > limit {
                    return Err(Error::BoundaryLineTooLong);
                }
                self.buffer.skip(idx + 2);

                let slot = Arc::new(Mutex::new(PartShared::new()));
                self.current = Some(Arc::clone(&slot));
                self.body = BodyProgress::new(self.limits.part_size);
                self.stage = Stage::PartHeaders;
                Ok(Step::Event(EventKind::Part(slot)))
            }
            None => {
                if self.buffer.len() > limit {
                    return Err(Error::BoundaryLineTooLong);
                }
                if self.buffer.eof {
                    return Err(Error::UnexpectedEof);
                }
                Ok(Step::Pending)
            }
        }
    }

    /// Reads the part's header block up to the empty line and publishes
    /// the parsed map to the part slot.
    pub(crate) fn step_part_headers(&mut self, cx: &mut Context) -> crate::Result<Drive> {
        self.buffer.poll_stream(cx)?;

        // a part may carry no headers at all
        let empty = matches!(self.buffer.peek(2), Some(head) if head == constants::CRLF.as_bytes());
        if empty {
            self.buffer.skip(2);
            return self.finish_part_headers(HeaderMap::new());
        }

        match self.buffer.find(constants::CRLF_CRLF.as_bytes()) {
            Some(idx) => {
                let block = self.buffer.take(idx + 4);
                let headers = helpers::parse_header_block(&block)?;
                self.finish_part_headers(headers)
            }
            None => {
                if self.buffer.eof {
                    return Err(Error::UnexpectedEof);
                }
                Ok(Drive::Pending)
            }
        }
    }

    /// Publishes the header map, then applies the body-side verdicts:
    /// the headers future resolves even when the part's `Content-Length`
    /// turns out to be unusable.
    fn finish_part_headers(&mut self, headers: HeaderMap) -> crate::Result<Drive> {
        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .map(|value| value.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok()));

        let mut released = false;
        if let Some(slot) = &self.current {
            match slot.lock() {
                Ok(mut part) => {
                    released = part.released;
                    if !released {
                        part.headers = Some(Ok(headers));
                    }
                    part.wake_all();
                }
                Err(_) => return Err(Error::LockFailure),
            }
        }

        self.body.remaining = match content_length {
            Some(None) => {
                return Err(Error::MalformedHeaders {
                    cause: "invalid Content-Length value".to_owned(),
                });
            }
            Some(Some(length)) => {
                if !released && length > self.body.limit {
                    return Err(Error::LimitExceeded {
                        limit: self.body.limit,
                    });
                }
                Some(length)
            }
            None => None,
        };

        self.stage = Stage::PartBody;
        Ok(Drive::Again)
    }

    /// Copies the next stretch of the part body, or finishes the part
    /// when the boundary token is reached.
    ///
    /// Limit enforcement is waived for released parts so draining never
    /// manufactures errors the consumer no longer cares about.
    pub(crate) fn step_part_body(
        &mut self,
        cx: &mut Context,
        enforce_limit: bool,
    ) -> crate::Result<BodyStep> {
        self.buffer.poll_stream(cx)?;

        match self.body.remaining {
            Some(0) => {
                // the boundary token must follow an exact-length body
                let token = self.boundary.full();
                match self.buffer.try_skip(&token) {
                    Some(true) => {
                        self.finish_part()?;
                        Ok(BodyStep::Done)
                    }
                    Some(false) => Err(Error::InvalidFormat),
                    None => {
                        if self.buffer.eof {
                            Err(Error::UnexpectedEof)
                        } else {
                            Ok(BodyStep::Pending)
                        }
                    }
                }
            }
            Some(remaining) => {
                if self.buffer.is_empty() {
                    return if self.buffer.eof {
                        Err(Error::UnexpectedEof)
                    } else {
                        Ok(BodyStep::Pending)
                    };
                }
                let take = std::cmp::min(remaining, self.buffer.len() as u64) as usize;
                let chunk = self.buffer.take(take);
                self.body.remaining = Some(remaining - take as u64);
                self.body.copied += take as u64;
                Ok(BodyStep::Chunk(chunk))
            }
            None => {
                let token = self.boundary.full();
                match self.buffer.find(&token) {
                    Some(0) => {
                        self.buffer.skip(token.len());
                        self.finish_part()?;
                        Ok(BodyStep::Done)
                    }
                    Some(idx) => self.body_chunk(idx, enforce_limit),
                    None => {
                        if self.buffer.eof {
                            return Err(Error::UnexpectedEof);
                        }
                        let settled = self.buffer.len().saturating_sub(token.len() - 1);
                        if settled == 0 {
                            Ok(BodyStep::Pending)
                        } else {
                            self.body_chunk(settled, enforce_limit)
                        }
                    }
                }
            }
        }
    }

    fn body_chunk(&mut self, n: usize, enforce_limit: bool) -> crate::Result<BodyStep> {
        if enforce_limit && self.body.copied + n as u64 > self.body.limit {
            return Err(Error::LimitExceeded {
                limit: self.body.limit,
            });
        }
        let chunk = self.buffer.take(n);
        self.body.copied += n as u64;
        Ok(BodyStep::Chunk(chunk))
    }

    fn finish_part(&mut self) -> crate::Result<()> {
        if let Some(slot) = self.current.take() {
            match slot.lock() {
                Ok(mut part) => {
                    part.done = true;
                    part.wake_all();
                }
                Err(_) => return Err(Error::LockFailure),
            }
        }
        self.stage = Stage::BoundarySuffix;
        self.wake_event();
        Ok(())
    }

    /// Delimits the epilogue by the declared total length. Without one
    /// the trailing bytes cannot be told apart from connection-close
    /// noise and nothing is emitted.
    pub(crate) fn step_epilogue(&mut self, cx: &mut Context) -> crate::Result<Step> {
        let total = match self.total_length {
            Some(total) => total,
            None => {
                self.stage = Stage::End;
                return Ok(Step::Again);
            }
        };

        let remaining = total.saturating_sub(self.buffer.total_bytes_read());
        if remaining > constants::MAX_EPILOGUE_SIZE {
            return Err(Error::LimitExceeded {
                limit: constants::MAX_EPILOGUE_SIZE,
            });
        }
        if remaining == 0 {
            self.stage = Stage::End;
            return Ok(Step::Again);
        }

        self.buffer.poll_stream(cx)?;
        if self.buffer.len() as u64 >= remaining {
            let epilogue = self.buffer.take(remaining as usize);
            self.stage = Stage::End;
            Ok(Step::Event(EventKind::Epilogue(epilogue)))
        } else if self.buffer.eof {
            Err(Error::UnexpectedEof)
        } else {
            Ok(Step::Pending)
        }
    }
}
