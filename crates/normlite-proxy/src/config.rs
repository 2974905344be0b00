//! The proxy adapter has no configuration surface of its own: it is handed
//! the same [`NormliteConfig`] the rest of the crate loads, and only adds
//! the one thing specific to serving it over HTTP — a socket address.

use normlite_core::NormliteConfig;

#[must_use]
pub fn bind_address(config: &NormliteConfig) -> String {
    format!("{}:{}", config.server.host, config.server.port)
}
