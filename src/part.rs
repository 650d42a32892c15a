use crate::state::{BodyStep, Drive, MultipartState, PartShared, Stage};
use crate::Error;
use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, TryStreamExt};
use http::header::HeaderMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// A single multipart part: a headers future paired with a body
/// substream, both backed by the shared parser state.
///
/// The headers resolve strictly before the body yields its first byte.
/// Dropping the part, or its body, before the body has been fully read
/// releases it: the parser drains the remaining payload itself and an
/// undelivered headers future resolves to [`Error::Cancelled`]. The
/// parser will not move on to the next event until the part has been
/// read to completion or released.
pub struct Part<S> {
    headers: PartHeaders<S>,
    body: PartBody<S>,
    resolved: Option<HeaderMap>,
}

impl<S: Stream<Item = Result<Bytes, Error>> + Send + Sync + Unpin + 'static> Part<S> {
    pub(crate) fn new(state: Arc<Mutex<MultipartState<S>>>, slot: Arc<Mutex<PartShared>>) -> Self {
        Part {
            headers: PartHeaders {
                state: Arc::clone(&state),
                slot: Arc::clone(&slot),
                finished: false,
            },
            body: PartBody {
                state,
                slot,
                done: false,
            },
            resolved: None,
        }
    }

    /// Resolves the part's headers, caching the map for repeated calls.
    pub async fn headers(&mut self) -> crate::Result<HeaderMap> {
        if let Some(cached) = &self.resolved {
            return Ok(cached.clone());
        }
        let headers = (&mut self.headers).await?;
        self.resolved = Some(headers.clone());
        Ok(headers)
    }

    /// Reads the next chunk of the part body.
    pub async fn chunk(&mut self) -> crate::Result<Option<Bytes>> {
        self.body.try_next().await
    }

    /// Collects the whole part body into one buffer.
    pub async fn bytes(&mut self) -> crate::Result<Bytes> {
        let mut buf = BytesMut::new();

        while let Some(bytes) = self.chunk().await? {
            buf.extend_from_slice(&bytes);
        }

        Ok(buf.freeze())
    }

    /// Splits the part into its headers future and body substream for
    /// independent consumption.
    pub fn into_parts(self) -> (PartHeaders<S>, PartBody<S>) {
        (self.headers, self.body)
    }
}

impl<S: Stream<Item = Result<Bytes, Error>> + Send + Sync + Unpin + 'static> Stream for Part<S> {
    type Item = crate::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().body).poll_next(cx)
    }
}

/// Future for a part's parsed header block.
///
/// Resolved by whichever side reaches the headers first: awaiting this
/// future drives the parse directly, while polling the body or draining
/// a released part completes it as a side effect.
pub struct PartHeaders<S> {
    state: Arc<Mutex<MultipartState<S>>>,
    slot: Arc<Mutex<PartShared>>,
    finished: bool,
}

impl<S: Stream<Item = Result<Bytes, Error>> + Send + Sync + Unpin + 'static> Future
    for PartHeaders<S>
{
    type Output = crate::Result<HeaderMap>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(Err(Error::Cancelled));
        }

        loop {
            {
                let mut slot = match this.slot.lock() {
                    Ok(guard) => guard,
                    Err(_) => return Poll::Ready(Err(Error::LockFailure)),
                };
                if let Some(result) = slot.headers.take() {
                    this.finished = true;
                    return Poll::Ready(result);
                }
                if let Some(err) = slot.failed.clone() {
                    this.finished = true;
                    return Poll::Ready(Err(err));
                }
                if slot.released || slot.done {
                    this.finished = true;
                    return Poll::Ready(Err(Error::Cancelled));
                }
            }

            let mut state = match this.state.lock() {
                Ok(guard) => guard,
                Err(_) => return Poll::Ready(Err(Error::LockFailure)),
            };
            if let Some(err) = state.error.clone() {
                this.finished = true;
                return Poll::Ready(Err(err));
            }

            if state.is_current(&this.slot) && state.stage == Stage::PartHeaders {
                match state.step_part_headers(cx) {
                    Ok(Drive::Again) => continue,
                    Ok(Drive::Pending) => {
                        match this.slot.lock() {
                            Ok(mut slot) => slot.headers_waker = Some(cx.waker().clone()),
                            Err(_) => return Poll::Ready(Err(Error::LockFailure)),
                        }
                        return Poll::Pending;
                    }
                    Err(err) => {
                        // the slot now carries either the published map
                        // or the failure; the next pass delivers it
                        state.fail(err);
                        continue;
                    }
                }
            }

            // another driver owns the parse right now; park unless the
            // outcome arrived between the two locks
            let parked = match this.slot.lock() {
                Ok(mut slot) => {
                    if slot.headers.is_some()
                        || slot.failed.is_some()
                        || slot.released
                        || slot.done
                    {
                        false
                    } else {
                        slot.headers_waker = Some(cx.waker().clone());
                        true
                    }
                }
                Err(_) => return Poll::Ready(Err(Error::LockFailure)),
            };
            if parked {
                return Poll::Pending;
            }
        }
    }
}

/// Byte substream of a single part body.
///
/// One reader at a time; chunks are split off the shared input buffer
/// without copying. Dropping the substream before it has finished
/// releases the part.
pub struct PartBody<S> {
    state: Arc<Mutex<MultipartState<S>>>,
    slot: Arc<Mutex<PartShared>>,
    done: bool,
}

impl<S: Stream<Item = Result<Bytes, Error>> + Send + Sync + Unpin + 'static> Stream for PartBody<S> {
    type Item = crate::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        loop {
            {
                let slot = match this.slot.lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        this.done = true;
                        return Poll::Ready(Some(Err(Error::LockFailure)));
                    }
                };
                if let Some(err) = slot.failed.clone() {
                    this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                if slot.done || slot.released {
                    this.done = true;
                    return Poll::Ready(None);
                }
            }

            let mut state = match this.state.lock() {
                Ok(guard) => guard,
                Err(_) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(Error::LockFailure)));
                }
            };
            if let Some(err) = state.error.clone() {
                this.done = true;
                return Poll::Ready(Some(Err(err)));
            }
            if !state.is_current(&this.slot) {
                // the part settled between the two locks; the slot flags
                // carry the outcome
                continue;
            }

            match state.stage {
                Stage::PartHeaders => match state.step_part_headers(cx) {
                    Ok(Drive::Again) => continue,
                    Ok(Drive::Pending) => {
                        match this.slot.lock() {
                            Ok(mut slot) => slot.body_waker = Some(cx.waker().clone()),
                            Err(_) => {
                                this.done = true;
                                return Poll::Ready(Some(Err(Error::LockFailure)));
                            }
                        }
                        return Poll::Pending;
                    }
                    Err(err) => {
                        state.fail(err.clone());
                        this.done = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                },
                Stage::PartBody => match state.step_part_body(cx, true) {
                    Ok(BodyStep::Chunk(bytes)) => return Poll::Ready(Some(Ok(bytes))),
                    Ok(BodyStep::Done) => {
                        this.done = true;
                        return Poll::Ready(None);
                    }
                    Ok(BodyStep::Pending) => {
                        match this.slot.lock() {
                            Ok(mut slot) => slot.body_waker = Some(cx.waker().clone()),
                            Err(_) => {
                                this.done = true;
                                return Poll::Ready(Some(Err(Error::LockFailure)));
                            }
                        }
                        return Poll::Pending;
                    }
                    Err(err) => {
                        state.fail(err.clone());
                        this.done = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                },
                _ => continue,
            }
        }
    }
}

impl<S> Drop for PartBody<S> {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        // released before the body finished: cancel an undelivered
        // headers future and hand the rest of the payload back to the
        // parser to drain
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(err) => {
                log::error!("partstream: couldn't lock the multipart state on release: {}", err);
                return;
            }
        };

        match self.slot.lock() {
            Ok(mut slot) => {
                if slot.done || slot.failed.is_some() {
                    return;
                }
                slot.released = true;
                slot.headers = Some(Err(Error::Cancelled));
                slot.wake_all();
            }
            Err(err) => {
                log::error!("partstream: couldn't lock the part slot on release: {}", err);
                return;
            }
        }

        state.wake_event();
    }
}
