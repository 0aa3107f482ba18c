use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

/// User agent sent to the catalog.
const USER_AGENT: &str = concat!("gumshoe/", env!("CARGO_PKG_VERSION"));

/// Idle connections kept per catalog host. The catalog limiter caps
/// concurrent lookups, so there is no point keeping more than that around.
const POOL_MAX_IDLE_PER_HOST: usize = 10;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the shared `reqwest::Client` used for catalog requests.
///
/// A zero `request_timeout` leaves requests unbounded.
pub fn build_client(request_timeout: Duration) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST);

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder.build().unwrap_or_else(|error| {
        warn!(
            error = %error,
            "Failed to create configured HTTP client; falling back to reqwest defaults"
        );
        reqwest::Client::new()
    })
}
