use crate::boundary::Boundary;
use crate::event::MultipartEvent;
use crate::limits::Limits;
use crate::part::Part;
use crate::state::{BodyStep, Drive, EventKind, MultipartState, Stage, Step};
use crate::Error;
use bytes::Bytes;
use futures::stream::{Stream, TryStreamExt};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// A lazy, one-shot stream of [`MultipartEvent`]s read from an input
/// byte stream.
///
/// The producer never runs ahead of its consumer: nothing is parsed
/// until the stream is polled, and parsing does not advance past a part
/// until that part's body has been fully read or the part has been
/// released. A part that is neither read nor released therefore stalls
/// the stream; that is the consumption contract, not a deadlock.
///
/// Dropping the stream cancels parsing; an in-flight part then observes
/// [`Error::Cancelled`] on its headers future and body substream.
pub struct MultipartEvents<S> {
    state: Arc<Mutex<MultipartState<S>>>,
}

impl<S: Stream<Item = Result<Bytes, Error>> + Send + Sync + Unpin + 'static> MultipartEvents<S> {
    /// Creates an event stream over `stream` with the default [`Limits`].
    ///
    /// `total_length`, when known, delimits the epilogue; without it no
    /// `Epilogue` event is ever emitted.
    pub fn new(stream: S, boundary: Boundary, total_length: Option<u64>) -> MultipartEvents<S> {
        MultipartEvents::with_limits(stream, boundary, total_length, Limits::new())
    }

    pub fn with_limits(
        stream: S,
        boundary: Boundary,
        total_length: Option<u64>,
        limits: Limits,
    ) -> MultipartEvents<S> {
        MultipartEvents {
            state: Arc::new(Mutex::new(MultipartState::new(
                stream,
                boundary,
                total_length,
                limits,
            ))),
        }
    }

    /// Yields the next event, or `None` once the closing boundary and
    /// epilogue have been handled.
    pub async fn next_event(&mut self) -> crate::Result<Option<MultipartEvent<S>>> {
        self.try_next().await
    }
}

impl<S: Stream<Item = Result<Bytes, Error>> + Send + Sync + Unpin + 'static> Stream
    for MultipartEvents<S>
{
    type Item = crate::Result<MultipartEvent<S>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let mut state = match this.state.lock() {
                Ok(guard) => guard,
                Err(_) => return Poll::Ready(Some(Err(Error::LockFailure))),
            };

            if let Some(err) = state.error.clone() {
                return if state.error_emitted {
                    Poll::Ready(None)
                } else {
                    state.error_emitted = true;
                    Poll::Ready(Some(Err(err)))
                };
            }

            let step = match state.stage {
                Stage::Preamble => state.step_preamble(cx),
                Stage::BoundarySuffix => state.step_boundary_suffix(cx),
                Stage::BoundaryLine => state.step_boundary_line(cx),
                Stage::PartHeaders | Stage::PartBody => {
                    let slot = state.current.clone();
                    let slot = match slot {
                        Some(slot) => slot,
                        None => {
                            // the part settled as this poll began
                            state.stage = Stage::BoundarySuffix;
                            continue;
                        }
                    };
                    let released = match slot.lock() {
                        Ok(part) => part.released,
                        Err(_) => return Poll::Ready(Some(Err(Error::LockFailure))),
                    };

                    if !released {
                        // the part handles drive the input while the
                        // part is live
                        state.event_waker = Some(cx.waker().clone());
                        return Poll::Pending;
                    }

                    if state.stage == Stage::PartHeaders {
                        state.step_part_headers(cx).map(|drive| match drive {
                            Drive::Again => Step::Again,
                            Drive::Pending => Step::Pending,
                        })
                    } else {
                        state.step_part_body(cx, false).map(|body| match body {
                            BodyStep::Chunk(_) | BodyStep::Done => Step::Again,
                            BodyStep::Pending => Step::Pending,
                        })
                    }
                }
                Stage::Epilogue => state.step_epilogue(cx),
                Stage::End => return Poll::Ready(None),
            };

            match step {
                Ok(Step::Again) => continue,
                Ok(Step::Pending) => return Poll::Pending,
                Ok(Step::Event(event)) => match event {
                    EventKind::Preamble(bytes) => {
                        return Poll::Ready(Some(Ok(MultipartEvent::Preamble(bytes))));
                    }
                    EventKind::Epilogue(bytes) => {
                        return Poll::Ready(Some(Ok(MultipartEvent::Epilogue(bytes))));
                    }
                    EventKind::Part(slot) => {
                        drop(state);
                        let part = Part::new(Arc::clone(&this.state), slot);
                        return Poll::Ready(Some(Ok(MultipartEvent::Part(part))));
                    }
                },
                Err(err) => {
                    // surfaced by the error check on the next pass
                    state.fail(err);
                }
            }
        }
    }
}

impl<S> Drop for MultipartEvents<S> {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(err) => {
                log::error!("partstream: couldn't lock the multipart state on drop: {}", err);
                return;
            }
        };

        if state.stage != Stage::End && state.error.is_none() {
            state.fail(Error::Cancelled);
        }
    }
}
