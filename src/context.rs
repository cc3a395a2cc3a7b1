//! Shared transfer context: the one place reactor events and engine
//! callbacks meet.
//!
//! A `Context` owns one transfer engine, one reactor timer, and the socket
//! registry, all behind a single serialization lock. Reactor workers may
//! deliver readiness and timer callbacks concurrently; every delivery is
//! marshaled through the lock before it touches the engine. Engine entry
//! points receive a short-lived borrow of the host-side state
//! ([`HostState`]) instead of going back through the lock, so the engine
//! re-entering its host callbacks mid-drive — rescheduling the timeout from
//! inside the timeout handler, closing sockets while being driven — can
//! never deadlock.
//!
//! Completion callbacks are extracted under the lock but invoked after it
//! is released, so an application callback may immediately start new
//! fetches on the same context.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;

use crate::config::Config;
use crate::engine::{
    Completion, EngineHost, Interest, SinkVerdict, SocketId, TimeoutChange, TransferEngine,
    TransferId, TransferResult, TransferSpec,
};
use crate::error::Error;
use crate::event_loop::{EventLoop, Timer};
use crate::metrics;
use crate::registry::SocketRegistry;
use crate::request::{FetchCallback, FetchStatus, RequestState};

/// A completion ready to run once the serialization lock is released.
type Delivery = (FetchCallback, FetchStatus, Bytes);

/// Hosts any number of concurrent fetches on one reactor.
///
/// Dropping the context (or calling [`shutdown`](Context::shutdown))
/// removes every outstanding transfer from the engine, tears down every
/// socket watch, and synchronously invokes each outstanding completion
/// callback exactly once with [`FetchStatus::Aborted`].
pub struct Context {
    shared: Arc<ContextShared>,
}

impl Context {
    /// Create a context with the default [`Config`].
    pub fn new(event_loop: Arc<dyn EventLoop>, engine: Box<dyn TransferEngine>) -> Context {
        Context::with_config(event_loop, engine, Config::default())
    }

    /// Create a context with an explicit config.
    pub fn with_config(
        event_loop: Arc<dyn EventLoop>,
        engine: Box<dyn TransferEngine>,
        config: Config,
    ) -> Context {
        let shared = Arc::new_cyclic(|weak: &Weak<ContextShared>| {
            let timer = {
                let weak = weak.clone();
                event_loop.timer(Arc::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_timer();
                    }
                }))
            };
            ContextShared {
                event_loop: event_loop.clone(),
                config,
                inner: Mutex::new(ContextInner {
                    engine,
                    host: HostState {
                        event_loop,
                        shared: weak.clone(),
                        timer,
                        sockets: SocketRegistry::new(),
                        opened: HashSet::new(),
                        in_flight: HashMap::new(),
                        next_transfer: 1,
                        shut_down: false,
                    },
                }),
            }
        });
        Context { shared }
    }

    /// The event loop this context schedules on.
    pub fn event_loop(&self) -> &Arc<dyn EventLoop> {
        &self.shared.event_loop
    }

    /// Number of fetches currently in flight.
    pub fn active_fetches(&self) -> usize {
        self.shared.lock().host.in_flight.len()
    }

    /// Whether a readiness watch is currently registered for `socket`.
    pub fn is_watching(&self, socket: SocketId) -> bool {
        self.shared.lock().host.sockets.contains(socket)
    }

    /// Number of sockets currently registered for readiness watching.
    pub fn watched_sockets(&self) -> usize {
        self.shared.lock().host.sockets.len()
    }

    /// Abort all outstanding fetches and detach from the engine. Idempotent;
    /// also runs on drop. Every outstanding completion callback is invoked
    /// with [`FetchStatus::Aborted`] before this returns.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub(crate) fn shared(&self) -> &Arc<ContextShared> {
        &self.shared
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

pub(crate) struct ContextShared {
    event_loop: Arc<dyn EventLoop>,
    config: Config,
    inner: Mutex<ContextInner>,
}

struct ContextInner {
    engine: Box<dyn TransferEngine>,
    host: HostState,
}

/// The host-side half of the context state: everything the engine's
/// callbacks operate on. Split out from [`ContextInner`] so the engine and
/// its host surface can be borrowed simultaneously.
struct HostState {
    event_loop: Arc<dyn EventLoop>,
    shared: Weak<ContextShared>,
    timer: Box<dyn Timer>,
    sockets: SocketRegistry,
    /// Native sockets the engine opened through us and has not closed yet,
    /// watched or not.
    opened: HashSet<SocketId>,
    /// In-flight table. The entry keeps the request state alive until its
    /// terminal delivery, whoever else drops their handle.
    in_flight: HashMap<TransferId, Arc<RequestState>>,
    next_transfer: u64,
    shut_down: bool,
}

impl ContextShared {
    fn lock(&self) -> MutexGuard<'_, ContextInner> {
        self.inner.lock().expect("context state poisoned")
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Register a new transfer with the engine. Called by
    /// [`Request::fetch`](crate::Request::fetch).
    pub(crate) fn start_fetch(
        &self,
        state: &Arc<RequestState>,
        url: &str,
        payload: Option<Bytes>,
        callback: FetchCallback,
    ) -> Result<(), Error> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let id = TransferId::from_raw(inner.host.next_transfer);
        state.begin(id, callback)?;
        inner.host.next_transfer += 1;

        if inner.host.shut_down {
            // Too late to reach the engine; deliver the abort off the lock.
            let state = state.clone();
            self.event_loop.post(Box::new(move || {
                let (callback, body) = state.take_completion();
                if let Some(callback) = callback {
                    metrics::FETCHES_ABORTED.increment();
                    callback(FetchStatus::Aborted, body);
                }
            }));
            return Ok(());
        }

        let mut headers = state.headers_snapshot();
        if payload.is_some()
            && !headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            headers.push((
                "content-type".to_string(),
                "application/octet-stream".to_string(),
            ));
        }
        let spec = TransferSpec {
            url: url.to_string(),
            verify_tls_peer: self.config.verify_tls_peer,
            max_body_bytes: self.config.max_body_bytes,
            headers,
            payload,
        };

        inner.host.in_flight.insert(id, state.clone());
        metrics::FETCHES_STARTED.increment();
        metrics::FETCHES_ACTIVE.increment();

        if inner.engine.add(id, spec, &mut inner.host).is_err() {
            // The handle still gets its callback: deferred, through the
            // normal completion extraction, never reentrant inside fetch.
            let shared = inner.host.shared.clone();
            self.event_loop.post(Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.finish_rejected(id);
                }
            }));
        }
        Ok(())
    }

    /// Deliver the deferred "engine declined" completion for one transfer.
    fn finish_rejected(&self, id: TransferId) {
        let mut delivery = None;
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.engine.remove(id, &mut inner.host);
            if let Some(state) = inner.host.in_flight.remove(&id) {
                metrics::FETCHES_ACTIVE.decrement();
                let (callback, body) = state.take_completion();
                if let Some(callback) = callback {
                    delivery = Some((callback, body));
                }
            }
        }
        if let Some((callback, body)) = delivery {
            metrics::FETCHES_REJECTED.increment();
            callback(FetchStatus::Rejected, body);
        }
    }

    /// Reactor timer fired: run the engine's timeout handler, then drain.
    fn on_timer(&self) {
        let mut deliveries = Vec::new();
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.host.shut_down {
                return;
            }
            let running = inner.engine.drive_timeout(&mut inner.host);
            drain_completions(inner, &mut deliveries);
            if running == 0 {
                inner.host.timer.cancel();
            }
        }
        deliver(deliveries);
    }

    /// Reactor readiness fired for one watched socket.
    fn on_socket_ready(&self, socket: SocketId, readiness: Interest) {
        let mut deliveries = Vec::new();
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.host.shut_down {
                return;
            }
            // The engine may have closed the socket between this
            // notification being queued and it firing.
            if !inner.host.sockets.contains(socket) {
                return;
            }
            let running = inner.engine.drive_socket(socket, readiness, &mut inner.host);
            drain_completions(inner, &mut deliveries);
            if running == 0 {
                inner.host.timer.cancel();
            }
        }
        deliver(deliveries);
    }

    fn shutdown(&self) {
        let mut deliveries = Vec::new();
        {
            // Runs from Drop: a context poisoned by an engine-integration
            // panic has nothing consistent left to tear down.
            let Ok(mut guard) = self.inner.lock() else {
                return;
            };
            let inner = &mut *guard;
            if inner.host.shut_down {
                return;
            }
            inner.host.shut_down = true;
            inner.host.timer.cancel();

            let ids: Vec<TransferId> = inner.host.in_flight.keys().copied().collect();
            for id in ids {
                inner.engine.remove(id, &mut inner.host);
                if let Some(state) = inner.host.in_flight.remove(&id) {
                    metrics::FETCHES_ACTIVE.decrement();
                    let (callback, body) = state.take_completion();
                    if let Some(callback) = callback {
                        deliveries.push((callback, FetchStatus::Aborted, body));
                    }
                }
            }

            // Sockets the engine never got to close: drop the watches, then
            // close the stray handles.
            inner.host.sockets.drain();
            for socket in inner.host.opened.drain() {
                inner.host.event_loop.close_socket(socket);
                metrics::SOCKETS_CLOSED.increment();
            }
        }
        for (callback, status, body) in deliveries {
            metrics::FETCHES_ABORTED.increment();
            callback(status, body);
        }
    }
}

/// Pop finished-transfer notifications until none remain. The sole path by
/// which engine-reported results reach a request.
fn drain_completions(inner: &mut ContextInner, out: &mut Vec<Delivery>) {
    while let Some(Completion { id, result }) = inner.engine.pop_completion() {
        inner.engine.remove(id, &mut inner.host);
        let Some(state) = inner.host.in_flight.remove(&id) else {
            continue;
        };
        metrics::FETCHES_ACTIVE.decrement();
        metrics::FETCHES_COMPLETED.increment();
        let (callback, body) = state.take_completion();
        let status = match result {
            TransferResult::Ok => FetchStatus::Ok,
            TransferResult::Failed(error) => FetchStatus::Transport(error),
            TransferResult::WriteAborted => FetchStatus::BodyTooLarge,
        };
        if let Some(callback) = callback {
            out.push((callback, status, body));
        }
    }
}

fn deliver(deliveries: Vec<Delivery>) {
    for (callback, status, body) in deliveries {
        callback(status, body);
    }
}

impl EngineHost for HostState {
    fn open_socket(&mut self) -> std::io::Result<SocketId> {
        let socket = self.event_loop.open_socket()?;
        self.opened.insert(socket);
        metrics::SOCKETS_OPENED.increment();
        Ok(socket)
    }

    fn close_socket(&mut self, socket: SocketId) {
        self.sockets.remove(socket);
        if !self.opened.remove(&socket) {
            panic!("engine closed unknown socket {socket:?}");
        }
        self.event_loop.close_socket(socket);
        metrics::SOCKETS_CLOSED.increment();
    }

    fn update_interest(&mut self, socket: SocketId, interest: Interest) {
        if interest.is_empty() {
            // Stop watching only. The connection stays with the engine.
            self.sockets.remove(socket);
            return;
        }
        if !self.sockets.contains(socket) {
            if !self.opened.contains(&socket) {
                panic!("engine requested watch on unknown socket {socket:?}");
            }
            let on_ready = {
                let shared = self.shared.clone();
                Arc::new(move |readiness: Interest| {
                    if let Some(shared) = shared.upgrade() {
                        shared.on_socket_ready(socket, readiness);
                    }
                })
            };
            let watch = match self.event_loop.watch(socket, on_ready) {
                Ok(watch) => watch,
                Err(error) => panic!("failed to watch socket {socket:?}: {error}"),
            };
            self.sockets.insert(socket, watch);
            metrics::SOCKETS_WATCHED.increment();
        }
        if let Some(watch) = self.sockets.find(socket) {
            watch.request(interest);
        }
    }

    fn reschedule_timeout(&mut self, change: TimeoutChange) {
        match change {
            TimeoutChange::After(delay) => {
                self.timer.arm(delay);
                metrics::TIMER_REARMS.increment();
            }
            TimeoutChange::Cancel => {
                self.timer.cancel();
                metrics::TIMER_CANCELS.increment();
            }
        }
    }

    fn sink_body(&mut self, id: TransferId, data: &[u8]) -> SinkVerdict {
        let Some(state) = self.in_flight.get(&id) else {
            panic!("engine wrote body for unknown transfer {id:?}");
        };
        state.append_body(data)
    }
}
