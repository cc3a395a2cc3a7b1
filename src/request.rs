//! One in-flight HTTP fetch: bounded response buffer, one-shot completion
//! callback, and the arming/extraction handshake with the context.

use std::mem;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

use crate::context::{Context, ContextShared};
use crate::engine::{SinkVerdict, TransferError, TransferId};
use crate::error::Error;
use crate::metrics;

/// Completion callback for one fetch: result code plus the buffered body
/// bytes in arrival order.
pub type FetchCallback = Box<dyn FnOnce(FetchStatus, Bytes) + Send>;

/// Terminal result delivered to a fetch's completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The transfer ran to completion.
    Ok,
    /// The engine reported a transport-level failure.
    Transport(TransferError),
    /// The response exceeded the buffering cap and the transfer was
    /// aborted. The delivered body holds the bytes buffered before the cap.
    BodyTooLarge,
    /// The engine declined the transfer at registration.
    Rejected,
    /// The owning context was shut down with this fetch outstanding.
    Aborted,
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchStatus::Ok)
    }
}

/// A reusable handle for one logical HTTP fetch against a shared
/// [`Context`].
///
/// `fetch` arms the handle and registers it with the context's transfer
/// engine; the completion callback fires exactly once per fetch, after the
/// transfer has left the engine. A self-managed request (the default) stays
/// alive through the context's in-flight table even if this handle is
/// dropped mid-transfer, so the callback still fires. A caller-owned
/// request behaves the same way — the flag only signals that the caller
/// intends to keep the handle, e.g. to fetch again after completion.
pub struct Request {
    state: Arc<RequestState>,
}

impl Request {
    /// Bind a self-managed request to a context. No I/O happens yet.
    pub fn new(context: &Context) -> Request {
        Request::with_self_manage(context, true)
    }

    /// Bind a request with an explicit self-manage policy.
    pub fn with_self_manage(context: &Context, self_managed: bool) -> Request {
        Request {
            state: Arc::new(RequestState {
                ctx: context.shared().clone(),
                self_managed,
                inner: Mutex::new(RequestInner {
                    buf: BytesMut::new(),
                    headers: Vec::new(),
                    callback: None,
                    transfer: None,
                }),
            }),
        }
    }

    pub fn self_managed(&self) -> bool {
        self.state.self_managed
    }

    /// Whether a transfer is currently armed on this handle.
    pub fn is_in_flight(&self) -> bool {
        self.state.lock().transfer.is_some()
    }

    /// Add a header sent with every subsequent fetch on this handle.
    pub fn header(&self, name: &str, value: &str) -> &Request {
        self.state
            .lock()
            .headers
            .push((name.to_string(), value.to_string()));
        self
    }

    /// Start an asynchronous fetch of `url`.
    ///
    /// A payload turns the transfer into a POST-style request. The callback
    /// receives the terminal [`FetchStatus`] and the buffered body exactly
    /// once, on the reactor's serialized execution, never from inside this
    /// call. Every outcome is delivered through the callback — including
    /// engine rejection and context teardown; the only error returned here
    /// is [`Error::RequestInFlight`], in which case the callback is dropped
    /// unused.
    pub fn fetch<F>(&self, url: &str, payload: Option<Bytes>, callback: F) -> Result<(), Error>
    where
        F: FnOnce(FetchStatus, Bytes) + Send + 'static,
    {
        self.state
            .ctx
            .start_fetch(&self.state, url, payload, Box::new(callback))
    }
}

pub(crate) struct RequestState {
    pub(crate) ctx: Arc<ContextShared>,
    self_managed: bool,
    inner: Mutex<RequestInner>,
}

struct RequestInner {
    buf: BytesMut,
    headers: Vec<(String, String)>,
    callback: Option<FetchCallback>,
    transfer: Option<TransferId>,
}

impl RequestState {
    fn lock(&self) -> std::sync::MutexGuard<'_, RequestInner> {
        self.inner.lock().expect("request state poisoned")
    }

    /// Arm the request for a new transfer. Fails if one is already armed.
    pub(crate) fn begin(&self, id: TransferId, callback: FetchCallback) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.transfer.is_some() {
            return Err(Error::RequestInFlight);
        }
        inner.buf.clear();
        inner.callback = Some(callback);
        inner.transfer = Some(id);
        Ok(())
    }

    pub(crate) fn headers_snapshot(&self) -> Vec<(String, String)> {
        self.lock().headers.clone()
    }

    /// Write-sink append with the context's response cap enforced.
    pub(crate) fn append_body(&self, data: &[u8]) -> SinkVerdict {
        let cap = self.ctx.config().max_body_bytes;
        let mut inner = self.lock();
        let verdict = append_capped(&mut inner.buf, cap, data);
        match verdict {
            SinkVerdict::Accepted => {
                metrics::BODY_BYTES_BUFFERED.add(data.len() as u64);
            }
            SinkVerdict::Overflow => {
                metrics::BODY_OVERFLOWS.increment();
            }
        }
        verdict
    }

    /// Disarm and take the one-shot completion state. The callback comes
    /// back at most once per armed transfer, which is what makes every
    /// delivery path exactly-once.
    pub(crate) fn take_completion(&self) -> (Option<FetchCallback>, Bytes) {
        let mut inner = self.lock();
        inner.transfer = None;
        let body = mem::take(&mut inner.buf).freeze();
        (inner.callback.take(), body)
    }
}

/// Append `data` to `buf` unless that would grow it past `cap`.
/// Nothing is appended on overflow.
fn append_capped(buf: &mut BytesMut, cap: usize, data: &[u8]) -> SinkVerdict {
    if buf.len() + data.len() > cap {
        return SinkVerdict::Overflow;
    }
    buf.extend_from_slice(data);
    SinkVerdict::Accepted
}
