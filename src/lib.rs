//! wireline — event-loop bridge for a multiplexed HTTP transfer engine.
//!
//! A transfer engine can run many concurrent HTTP fetches over a handful of
//! sockets, but it expects its host to watch those sockets for readiness,
//! run its coalesced timeout clock, and feed "ready" events back in. A
//! reactor-based application wants the opposite shape: uniform async
//! notifications it can subscribe to. wireline is the glue between the two
//! event models — it registers and deregisters sockets as the engine opens
//! and closes connections, mediates the timeout clock, drains the engine's
//! completion queue, and guarantees exactly-once terminal delivery per
//! fetch under error, re-entrant completion, and teardown.
//!
//! # Architecture
//!
//! [`Context`] owns one engine, one reactor timer, and the socket registry
//! behind a single serialization lock. Engine callbacks (socket open/close,
//! watch-interest changes, timeout rescheduling, the body write sink) are a
//! fixed set of named entry points on the host surface the context passes
//! into every engine call — the same shape as a driver context threaded
//! through handler callbacks, so re-entrant engine calls never re-enter the
//! lock. [`Request`] is one logical fetch: a bounded response buffer and a
//! one-shot completion callback, kept alive by the context's in-flight
//! table until its terminal delivery.
//!
//! The two external collaborators are traits: the engine implements
//! [`TransferEngine`] and the application's reactor implements
//! [`EventLoop`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wireline::{Context, Request};
//!
//! let context = Context::new(reactor.clone(), Box::new(engine));
//! let request = Request::new(&context);
//! request.fetch("https://example.com/resource", None, |status, body| {
//!     println!("{status:?}: {} bytes", body.len());
//! })?;
//! ```
//!
//! Engines with process-wide library state must be globally initialized by
//! the application before the first `Context` is constructed and cleaned up
//! after the last one is dropped; see the [`engine`] module docs.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod metrics;
pub(crate) mod registry;

// ── Public modules ──────────────────────────────────────────────────────
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod request;

// ── Re-exports: Core types ──────────────────────────────────────────────

/// Bridge configuration.
pub use config::Config;
/// Builder for [`Config`] with `build()` validation.
pub use config::ConfigBuilder;
/// Shared transfer context hosting any number of concurrent fetches.
pub use context::Context;
/// API misuse errors.
pub use error::Error;
/// One logical HTTP fetch against a shared context.
pub use request::Request;
/// Terminal result delivered to a fetch's completion callback.
pub use request::FetchStatus;

// ── Re-exports: Engine contract ─────────────────────────────────────────

/// One popped finished-transfer notification.
pub use engine::Completion;
/// The adapter surface the bridge presents to the engine.
pub use engine::EngineHost;
/// The engine's add entry point declined the transfer.
pub use engine::EngineRejected;
/// Readiness interest set for one socket.
pub use engine::Interest;
/// Verdict from the host's write sink.
pub use engine::SinkVerdict;
/// Identifies one native socket handle.
pub use engine::SocketId;
/// A change to the host's timeout clock.
pub use engine::TimeoutChange;
/// The multiplexed transfer engine, as seen by the bridge.
pub use engine::TransferEngine;
/// Transport-level failure classes an engine can report.
pub use engine::TransferError;
/// Identifies one logical transfer.
pub use engine::TransferId;
/// Terminal result the engine reports for one transfer.
pub use engine::TransferResult;
/// Everything the engine needs to know to run one transfer.
pub use engine::TransferSpec;

// ── Re-exports: Reactor contract ────────────────────────────────────────

/// The readiness-based event loop the bridge schedules on.
pub use event_loop::EventLoop;
/// Callback invoked when a watched socket becomes ready.
pub use event_loop::ReadyCallback;
/// An active readiness registration for one native socket.
pub use event_loop::SocketWatch;
/// A deferred unit of work.
pub use event_loop::Task;
/// A one-deadline timer owned by the context.
pub use event_loop::Timer;
/// Callback invoked when the context's timer fires.
pub use event_loop::TimerCallback;
