//! Bridge configuration.

use crate::error::Error;

/// Default per-fetch response buffering cap: 1 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Configuration for a [`Context`](crate::Context).
///
/// The defaults match the common case: TLS peers are verified and
/// responses are buffered up to 1 MiB before the transfer is aborted.
#[derive(Debug, Clone)]
pub struct Config {
    /// Verify the TLS peer certificate on every transfer.
    pub verify_tls_peer: bool,
    /// Per-fetch response buffering cap in bytes. A write that would grow
    /// the buffer past this cap is rejected at the engine's write sink,
    /// which aborts the transfer.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verify_tls_peer: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    /// Start building a config from the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            config: Config::default(),
        }
    }
}

/// Builder for [`Config`] with `build()` validation.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Whether to verify the TLS peer certificate.
    pub fn verify_tls_peer(mut self, verify: bool) -> Self {
        self.config.verify_tls_peer = verify;
        self
    }

    /// Response buffering cap in bytes. Must be nonzero.
    pub fn max_body_bytes(mut self, cap: usize) -> Self {
        self.config.max_body_bytes = cap;
        self
    }

    /// Validate and produce the config.
    pub fn build(self) -> Result<Config, Error> {
        if self.config.max_body_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_body_bytes must be nonzero".to_string(),
            ));
        }
        Ok(self.config)
    }
}
