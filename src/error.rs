use thiserror::Error;

/// Errors returned by the wireline API.
///
/// Per-transfer outcomes (transport failures, rejected registrations,
/// teardown aborts) are not errors in this sense — they are delivered
/// through the fetch completion callback as a
/// [`FetchStatus`](crate::request::FetchStatus).
#[derive(Debug, Error)]
pub enum Error {
    /// `fetch` was called on a request that already has a transfer in
    /// flight. The supplied callback is dropped unused; the in-flight
    /// transfer is unaffected.
    #[error("request already in flight")]
    RequestInFlight,

    /// Configuration failed builder validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
