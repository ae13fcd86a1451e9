//! Server configuration
//!
//! Everything is env-driven: `BRIDGE_PORT` for the listener, the
//! `BRIDGE_USE_HTTPS`/`BRIDGE_SSL_*` family for TLS, and tuning knobs for
//! the periodic loops. Defaults match the reference deployment.

use std::time::Duration;

/// TLS settings read from the `BRIDGE_SSL_*` env family.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub key_path: String,
    pub cert_path: String,
    pub ca_path: Option<String>,
    /// Accepted for config-compat; encrypted keys are rejected at startup.
    pub passphrase: Option<String>,
}

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// TCP port; env `BRIDGE_PORT`, default 3001.
    pub port: u16,
    /// TLS settings when `BRIDGE_USE_HTTPS=true` and paths are present.
    pub tls: Option<TlsSettings>,
    /// Honor `X-Forwarded-*` headers; env `BRIDGE_TRUST_PROXY`.
    pub trust_proxy: bool,

    /// Event log ring capacity.
    pub event_log_cap: usize,
    /// Telemetry ring capacity.
    pub telemetry_cap: usize,
    /// Chat transcript capacity.
    pub chat_cap: usize,

    /// Queue lease TTL.
    pub lease_ttl: Duration,
    /// Attempts before an item is dead-lettered.
    pub max_attempts: u32,
    /// Lease sweep interval.
    pub sweep_interval: Duration,

    /// Committer tick cadence.
    pub committer_cadence: Duration,
    /// Committer batch coalescing window.
    pub committer_window: Duration,
    /// Committer per-tick fan-in cap.
    pub committer_max: usize,
    /// Bound on the applied-patch-id idempotency set.
    pub idempotency_cap: usize,

    /// Scheduler tick cadence.
    pub scheduler_cadence: Duration,
    /// Safety drainer interval.
    pub drainer_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            tls: None,
            trust_proxy: false,
            event_log_cap: 5_000,
            telemetry_cap: 10_000,
            chat_cap: 500,
            lease_ttl: Duration::from_secs(30),
            max_attempts: 5,
            sweep_interval: Duration::from_millis(250),
            committer_cadence: Duration::from_millis(100),
            committer_window: Duration::from_millis(500),
            committer_max: 200,
            idempotency_cap: 100_000,
            scheduler_cadence: Duration::from_millis(250),
            drainer_interval: Duration::from_secs(1),
        }
    }
}

impl BridgeConfig {
    /// Build configuration from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_parse::<u16>("BRIDGE_PORT") {
            config.port = port;
        }
        config.trust_proxy = env_flag("BRIDGE_TRUST_PROXY");

        if env_flag("BRIDGE_USE_HTTPS") {
            let key_path = std::env::var("BRIDGE_SSL_KEY_PATH").ok();
            let cert_path = std::env::var("BRIDGE_SSL_CERT_PATH").ok();
            match (key_path, cert_path) {
                (Some(key_path), Some(cert_path)) => {
                    config.tls = Some(TlsSettings {
                        key_path,
                        cert_path,
                        ca_path: std::env::var("BRIDGE_SSL_CA_PATH").ok(),
                        passphrase: std::env::var("BRIDGE_SSL_PASSPHRASE").ok(),
                    });
                }
                _ => {
                    tracing::warn!(
                        "BRIDGE_USE_HTTPS set without BRIDGE_SSL_KEY_PATH/BRIDGE_SSL_CERT_PATH; serving plain HTTP"
                    );
                }
            }
        }

        if let Some(ms) = env_parse::<u64>("BRIDGE_LEASE_TTL_MS") {
            config.lease_ttl = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("BRIDGE_MAX_ATTEMPTS") {
            config.max_attempts = n;
        }
        if let Some(ms) = env_parse::<u64>("BRIDGE_COMMITTER_CADENCE_MS") {
            config.committer_cadence = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("BRIDGE_SCHEDULER_CADENCE_MS") {
            config.scheduler_cadence = Duration::from_millis(ms);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}
