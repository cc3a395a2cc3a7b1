//! wireline bridge metrics.
//!
//! Counters for the fetch lifecycle, socket watch churn, and timer
//! rescheduling. Exposed through the metriken registry like the rest of
//! the process's metrics.

use metriken::{Counter, Gauge, metric};

// ── Fetch lifecycle ──────────────────────────────────────────────

#[metric(
    name = "wireline/fetches/started",
    description = "Fetches handed to the transfer engine"
)]
pub static FETCHES_STARTED: Counter = Counter::new();

#[metric(
    name = "wireline/fetches/completed",
    description = "Fetches completed with an engine-reported result"
)]
pub static FETCHES_COMPLETED: Counter = Counter::new();

#[metric(
    name = "wireline/fetches/rejected",
    description = "Fetches the engine declined at registration"
)]
pub static FETCHES_REJECTED: Counter = Counter::new();

#[metric(
    name = "wireline/fetches/aborted",
    description = "Fetches aborted by context teardown"
)]
pub static FETCHES_ABORTED: Counter = Counter::new();

#[metric(
    name = "wireline/fetches/active",
    description = "Fetches currently in flight"
)]
pub static FETCHES_ACTIVE: Gauge = Gauge::new();

// ── Response buffering ───────────────────────────────────────────

#[metric(
    name = "wireline/body/bytes_buffered",
    description = "Response bytes accepted by the write sink"
)]
pub static BODY_BYTES_BUFFERED: Counter = Counter::new();

#[metric(
    name = "wireline/body/overflows",
    description = "Write-sink rejections for exceeding the response cap"
)]
pub static BODY_OVERFLOWS: Counter = Counter::new();

// ── Socket watch churn ───────────────────────────────────────────

#[metric(
    name = "wireline/sockets/opened",
    description = "Native sockets opened for the engine"
)]
pub static SOCKETS_OPENED: Counter = Counter::new();

#[metric(
    name = "wireline/sockets/watched",
    description = "Readiness watches established"
)]
pub static SOCKETS_WATCHED: Counter = Counter::new();

#[metric(
    name = "wireline/sockets/closed",
    description = "Native sockets closed on the engine's behalf"
)]
pub static SOCKETS_CLOSED: Counter = Counter::new();

// ── Timer ────────────────────────────────────────────────────────

#[metric(
    name = "wireline/timer/rearms",
    description = "Timeout clock rearms requested by the engine"
)]
pub static TIMER_REARMS: Counter = Counter::new();

#[metric(
    name = "wireline/timer/cancels",
    description = "Timeout clock cancellations"
)]
pub static TIMER_CANCELS: Counter = Counter::new();
