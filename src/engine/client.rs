//! HTTP client setup.
//!
//! One shared `reqwest` client backs every transfer an engine runs: its
//! connection pool is what lets the multi driver keep `parallel_downloads`
//! transfers in flight over a handful of mirror hosts. Requests are traced
//! through `reqwest-tracing`, so enabling a `tracing` subscriber surfaces
//! the wire activity.

use std::time::Duration;

use reqwest::redirect;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use super::config::EngineConfig;

/// Transport connect timeout.
const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Redirect-following cap.
const MAX_REDIRECTS: usize = 10;
/// TCP keepalive idle time.
const KEEPALIVE_SECS: u64 = 60;

/// Builds the engine's shared HTTP client.
pub(crate) fn build_client(config: &EngineConfig) -> Result<ClientWithMiddleware, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .tcp_keepalive(Duration::from_secs(KEEPALIVE_SECS));

    let user_agent = config
        .user_agent
        .clone()
        .or_else(|| std::env::var("HTTP_USER_AGENT").ok());
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }

    let client = builder.build()?;

    Ok(ClientBuilder::new(client)
        .with(TracingMiddleware::default())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let config = EngineConfig::default();
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn builds_with_user_agent_override() {
        let config = EngineConfig {
            user_agent: Some("pacfetch-test/1.0".into()),
            ..EngineConfig::default()
        };
        assert!(build_client(&config).is_ok());
    }
}
