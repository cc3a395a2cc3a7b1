//! The reactor contract.
//!
//! The bridge does no I/O scheduling of its own: timers, socket readiness,
//! and deferred execution all come from the application's event loop. The
//! loop may dispatch callbacks from any number of worker threads — the
//! bridge marshals every callback through its own serialization before
//! touching shared state, so implementations only need to deliver, never to
//! serialize.
//!
//! One delivery rule matters for correctness: readiness and timer callbacks
//! must be delivered asynchronously. An implementation must not invoke
//! `on_ready` from inside [`SocketWatch::request`] or `on_fire` from inside
//! [`Timer::arm`] on the calling thread, since the caller still holds the
//! bridge's internal state at that point.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Interest, SocketId};

/// Callback invoked when a watched socket becomes ready, with the observed
/// readiness set.
pub type ReadyCallback = Arc<dyn Fn(Interest) + Send + Sync>;

/// Callback invoked when the context's timer fires.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// A deferred unit of work handed to [`EventLoop::post`].
pub type Task = Box<dyn FnOnce() + Send>;

/// A one-deadline timer owned by the context.
pub trait Timer: Send {
    /// Arm the timer to fire after `after`. Re-arming replaces any
    /// previously set deadline; a zero delay fires on the loop's next turn.
    fn arm(&mut self, after: Duration);

    /// Disarm the timer. A cancelled deadline never fires.
    fn cancel(&mut self);
}

/// An active readiness registration for one native socket.
///
/// The watch does not own the native handle — dropping it deregisters the
/// socket from the reactor and nothing more. Closing the handle is a
/// separate [`EventLoop::close_socket`] call.
pub trait SocketWatch: Send {
    /// Set the interest set to be signaled for this socket. Notifications
    /// persist until the interest is changed or the watch is dropped.
    fn request(&mut self, interest: Interest);
}

/// The readiness-based event loop the bridge schedules on.
pub trait EventLoop: Send + Sync {
    /// Allocate a native nonblocking socket suitable for the engine's
    /// connections and return its identifier.
    fn open_socket(&self) -> io::Result<SocketId>;

    /// Close a native socket previously returned by
    /// [`open_socket`](Self::open_socket). Any watch for the socket must
    /// already have been dropped.
    fn close_socket(&self, socket: SocketId);

    /// Adopt a native socket for readiness watching. `on_ready` is invoked
    /// with the observed readiness every time an armed interest fires.
    fn watch(&self, socket: SocketId, on_ready: ReadyCallback)
    -> io::Result<Box<dyn SocketWatch>>;

    /// Create the context's timer. Called once per context.
    fn timer(&self, on_fire: TimerCallback) -> Box<dyn Timer>;

    /// Run `task` on the loop at the next opportunity. Used for completion
    /// deliveries that must not run reentrantly inside the caller.
    fn post(&self, task: Task);
}
