//! The transfer-engine contract.
//!
//! The engine is an opaque multiplexer: it manages any number of concurrent
//! HTTP transfers over a small set of sockets, but it does no I/O scheduling
//! of its own. Instead it asks its host — the [`Context`](crate::Context) —
//! to open and close native sockets, to watch them for readiness, and to run
//! a single coalesced timeout clock. The host feeds readiness and timer
//! expiry back in through the `drive_*` entry points and then drains the
//! completion queue.
//!
//! The callback set is fixed and known at compile time, so the contract is a
//! pair of plain traits rather than registered function pointers: the engine
//! implements [`TransferEngine`], and every engine entry point receives the
//! host's adapter surface as an explicit [`EngineHost`] argument. Calls made
//! on the host from inside an engine entry point are expected and must be
//! honored — the engine may open sockets, change watch interests, and
//! reschedule the timeout while it is being driven.
//!
//! Engines with process-wide library state (one-time global init and
//! cleanup) must be initialized by the embedding application before the
//! first `Context` is constructed and torn down after the last one is
//! dropped; that lifecycle is deliberately not modeled here.

use std::fmt;
use std::io;
use std::time::Duration;

use bytes::Bytes;

/// Identifies one logical transfer registered with the engine.
///
/// Minted by the bridge at `fetch` time; opaque to the engine beyond
/// equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(u64);

impl TransferId {
    pub fn from_raw(raw: u64) -> Self {
        TransferId(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Identifies one native socket handle the engine had the host open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    pub fn from_raw(raw: u64) -> Self {
        SocketId(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Readiness interest set for one socket: readable, writable, or both.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interest(u8);

impl Interest {
    /// No interest. As a watch request this means "stop watching".
    pub const NONE: Self = Self(0b00);
    /// Interest in read readiness.
    pub const READABLE: Self = Self(0b01);
    /// Interest in write readiness.
    pub const WRITABLE: Self = Self(0b10);

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_readable(&self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    pub fn contains(&self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(&self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }
}

impl std::ops::BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        self.union(rhs)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (false, false) => write!(f, "Interest(NONE)"),
            (true, false) => write!(f, "Interest(READABLE)"),
            (false, true) => write!(f, "Interest(WRITABLE)"),
            (true, true) => write!(f, "Interest(READABLE|WRITABLE)"),
        }
    }
}

/// Everything the engine needs to know to run one transfer.
#[derive(Debug, Clone)]
pub struct TransferSpec {
    /// Target URL.
    pub url: String,
    /// Whether to verify the TLS peer certificate.
    pub verify_tls_peer: bool,
    /// Response size cap the host's write sink enforces. Informational for
    /// the engine; the sink is authoritative.
    pub max_body_bytes: usize,
    /// Request headers as (name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Optional outbound payload. Present means a POST-style transfer.
    pub payload: Option<Bytes>,
}

/// Terminal result the engine reports for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResult {
    /// The transfer ran to completion.
    Ok,
    /// A transport-level failure ended the transfer.
    Failed(TransferError),
    /// The host's write sink rejected data and the transfer was aborted.
    WriteAborted,
}

/// Transport-level failure classes an engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Name resolution failed.
    #[error("name resolution failed")]
    Dns,
    /// The connection could not be established.
    #[error("connect failed")]
    Connect,
    /// The TLS handshake failed.
    #[error("TLS handshake failed")]
    Tls,
    /// The transfer exceeded the engine's own deadline.
    #[error("transfer timed out")]
    TimedOut,
    /// The peer violated the protocol.
    #[error("protocol error")]
    Protocol,
}

/// One popped "this transfer finished" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub id: TransferId,
    pub result: TransferResult,
}

/// The engine's add entry point declined the transfer.
#[derive(Debug, thiserror::Error)]
#[error("engine rejected transfer: {reason}")]
pub struct EngineRejected {
    pub reason: String,
}

/// Verdict from the host's write sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkVerdict {
    /// The bytes were buffered.
    Accepted,
    /// Buffering the bytes would exceed the response cap. The engine must
    /// abort the transfer and complete it with
    /// [`TransferResult::WriteAborted`].
    Overflow,
}

/// A change the engine wants made to the host's timeout clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutChange {
    /// Fire the timeout handler after this delay. A zero delay means "as
    /// soon as the reactor gets control again" and must not be dropped.
    After(Duration),
    /// Disarm the clock entirely.
    Cancel,
}

/// The adapter surface the bridge presents to the engine.
///
/// All five entry points may be invoked from inside any [`TransferEngine`]
/// method, including re-entrantly from `drive_timeout` and `drive_socket`.
pub trait EngineHost {
    /// Allocate a native socket for a new connection. The handle stays
    /// owned by the engine until it passes it back to
    /// [`close_socket`](Self::close_socket).
    fn open_socket(&mut self) -> io::Result<SocketId>;

    /// The engine is done with a socket: any readiness watch is dropped and
    /// the native handle is closed.
    fn close_socket(&mut self, socket: SocketId);

    /// Start, change, or stop watching a socket for readiness.
    /// [`Interest::NONE`] stops the watch without touching the connection.
    fn update_interest(&mut self, socket: SocketId, interest: Interest);

    /// Reschedule the host's coalesced timeout clock.
    fn reschedule_timeout(&mut self, change: TimeoutChange);

    /// Deliver response body bytes for a transfer. An
    /// [`Overflow`](SinkVerdict::Overflow) verdict obliges the engine to
    /// abort the transfer.
    fn sink_body(&mut self, id: TransferId, data: &[u8]) -> SinkVerdict;
}

/// The multiplexed transfer engine, as seen by the bridge.
pub trait TransferEngine: Send {
    /// Register a transfer. May synchronously invoke any host callback.
    fn add(
        &mut self,
        id: TransferId,
        spec: TransferSpec,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineRejected>;

    /// Remove a transfer. Idempotent; removing an id the engine does not
    /// know is a no-op.
    fn remove(&mut self, id: TransferId, host: &mut dyn EngineHost);

    /// Advance I/O on one socket with the observed readiness. Returns the
    /// number of transfers still running.
    fn drive_socket(
        &mut self,
        socket: SocketId,
        readiness: Interest,
        host: &mut dyn EngineHost,
    ) -> usize;

    /// The host's timeout clock fired. Returns the number of transfers
    /// still running.
    fn drive_timeout(&mut self, host: &mut dyn EngineHost) -> usize;

    /// Pop the next finished-transfer notification, if any.
    fn pop_completion(&mut self) -> Option<Completion>;
}
