//! Optional process-wide registry.
//!
//! Applications that prefer one registry per process can install it here
//! once at startup and fetch it from request handlers.

use std::sync::OnceLock;

use parking_lot::{Mutex, const_mutex};

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::reaper::RefreshHandle;
use crate::registry::SessionRegistry;

static REGISTRY: OnceLock<SessionRegistry> = OnceLock::new();

/// Serializes installers so only a started registry is ever published.
static INSTALL: Mutex<()> = const_mutex(());

/// Build, start and install the process-wide registry.
///
/// Nothing is installed if building or starting fails, so the call can be
/// retried. Fails with [`Error::AlreadyInstalled`] once a registry is in place.
pub fn install(config: RegistryConfig) -> Result<RefreshHandle> {
    let _guard = INSTALL.lock();
    if REGISTRY.get().is_some() {
        return Err(Error::AlreadyInstalled);
    }

    let registry = SessionRegistry::new(config)?;
    let refresh = registry.start()?;
    REGISTRY
        .set(registry)
        .map_err(|_| Error::AlreadyInstalled)?;
    Ok(refresh)
}

/// The process-wide registry.
pub fn registry() -> Result<SessionRegistry> {
    REGISTRY.get().cloned().ok_or(Error::NotInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // The only test touching the global; the OnceLock is per test binary.
    #[tokio::test]
    async fn test_install_once() {
        assert!(matches!(registry(), Err(Error::NotInitialized)));

        let config = RegistryConfig::new().with_timeout(Duration::from_secs(30));

        // A thread outside the runtime cannot start the reaper; nothing may
        // be installed and a later install must still succeed.
        let outside = {
            let config = config.clone();
            std::thread::spawn(move || install(config)).join().unwrap()
        };
        assert!(matches!(outside, Err(Error::NoRuntime)));
        assert!(matches!(registry(), Err(Error::NotInitialized)));

        let invalid = install(config.clone().with_timeout(Duration::ZERO));
        assert!(matches!(invalid, Err(Error::InvalidConfig(_))));
        assert!(matches!(registry(), Err(Error::NotInitialized)));

        let refresh = install(config.clone()).unwrap();

        let registry = registry().unwrap();
        assert!(registry.is_running());
        let resolved = registry.resolve(None).unwrap();
        assert!(refresh.refresh(resolved.id()).is_ok());

        assert!(matches!(install(config), Err(Error::AlreadyInstalled)));
    }
}
