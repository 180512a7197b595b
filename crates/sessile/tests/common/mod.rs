//! Common test utilities for integration tests.

use std::time::Duration;

use sessile::{ManualTicker, RegistryConfig, SessionRegistry, TickTrigger};

/// Install a log subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with the given timeout and a 5 second reap interval.
pub fn config(timeout_secs: u64) -> RegistryConfig {
    RegistryConfig::new()
        .with_timeout(Duration::from_secs(timeout_secs))
        .with_reap_interval(Duration::from_secs(5))
}

/// A registry whose reaper runs on the tokio clock.
pub fn clocked_registry(
    config: RegistryConfig,
) -> anyhow::Result<(SessionRegistry, sessile::RefreshHandle)> {
    init_tracing();
    let registry = SessionRegistry::new(config)?;
    let refresh = registry.start()?;
    Ok((registry, refresh))
}

/// A registry whose reaper only sweeps when the trigger fires.
pub fn manual_registry(
    config: RegistryConfig,
) -> anyhow::Result<(SessionRegistry, sessile::RefreshHandle, TickTrigger)> {
    init_tracing();
    let registry = SessionRegistry::new(config.clone())?;
    let (ticker, trigger) = ManualTicker::new(config.reap_interval);
    let refresh = registry.start_with_ticker(ticker)?;
    Ok((registry, refresh, trigger))
}
