//! The session registry: owner of every live session and of the reaper.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::RegistryConfig;
use crate::cookie::SessionCookie;
use crate::error::{Error, Result};
use crate::id;
use crate::reaper::{self, IntervalTicker, RefreshHandle, Ticker};
use crate::session::Session;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Reaper lifecycle, guarded by a mutex only touched by start/shutdown.
enum Lifecycle {
    Idle {
        refresh_rx: mpsc::UnboundedReceiver<String>,
    },
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Shared registry state. The reaper holds only a weak reference to it.
pub(crate) struct RegistryInner {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    config: RegistryConfig,
    timeout_millis: i64,
    cookie_name: Arc<str>,
    refresh_tx: mpsc::UnboundedSender<String>,
    state: AtomicU8,
    lifecycle: Mutex<Lifecycle>,
    created: AtomicU64,
    expired: AtomicU64,
    invalidated: AtomicU64,
}

impl RegistryInner {
    /// Build a session and insert it under a fresh identifier.
    ///
    /// The session is complete before it becomes visible in the map.
    /// The running state is re-checked under the map lock, so a concurrent
    /// shutdown either drains the new session or prevents its insertion.
    fn create(&self) -> Result<Arc<Session>> {
        loop {
            let id = self.config.id_strategy.generate();
            let session = Arc::new(Session::new(id.clone(), self.timeout_millis));

            let mut sessions = self.sessions.write();
            self.ensure_running()?;
            if let Entry::Vacant(entry) = sessions.entry(id) {
                entry.insert(Arc::clone(&session));
                let count = sessions.len();
                drop(sessions);

                self.created.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = %session.id(), sessions = count, "Session created");
                return Ok(session);
            }
            warn!("Generated session id collided with a live session, regenerating");
        }
    }

    /// Reset a live session's lifetime to the full timeout.
    ///
    /// Returns false (and does nothing) for unknown identifiers; the session
    /// may have expired between the signal being sent and handled.
    pub(crate) fn refresh(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read();
        match sessions.get(session_id) {
            Some(session) => {
                session.reset(self.timeout_millis);
                trace!(session_id = %session_id, "Session refreshed");
                true
            }
            None => {
                debug!(session_id = %session_id, "Refresh for unknown session ignored");
                false
            }
        }
    }

    /// Charge every session `elapsed` and evict those at or below zero.
    pub(crate) fn sweep(&self, elapsed: Duration) -> usize {
        let step = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);

        let mut evicted = Vec::new();
        let remaining = {
            let mut sessions = self.sessions.write();
            sessions.retain(|_, session| {
                if session.decrement(step) <= 0 {
                    evicted.push(Arc::clone(session));
                    false
                } else {
                    true
                }
            });
            sessions.len()
        };

        // Handlers still holding an evicted session see it as empty.
        for session in &evicted {
            session.expire();
            debug!(session_id = %session.id(), "Session expired");
        }

        let count = evicted.len();
        if count > 0 {
            self.expired.fetch_add(count as u64, Ordering::Relaxed);
            debug!(count, remaining, "Reaped expired sessions");
        } else {
            trace!(remaining, "Reaper sweep found nothing to evict");
        }
        count
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_RUNNING => Ok(()),
            STATE_IDLE => Err(Error::NotInitialized),
            _ => Err(Error::ShutDown),
        }
    }
}

/// Result of resolving a request's session.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The resolved session.
    pub session: Arc<Session>,

    /// Whether the session was created by this call. The caller must then
    /// hand the new identifier back to the client.
    pub is_new: bool,

    cookie_name: Arc<str>,
}

impl Resolved {
    /// The session identifier.
    pub fn id(&self) -> &str {
        self.session.id()
    }

    /// Cookie to set on the response, present only for new sessions.
    ///
    /// The domain is the request host without any port.
    pub fn cookie(&self, host: Option<&str>) -> Option<SessionCookie> {
        if !self.is_new {
            return None;
        }
        Some(SessionCookie::new(
            self.cookie_name.as_ref(),
            self.session.id(),
            host,
        ))
    }
}

/// Registry statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live sessions.
    pub sessions: usize,

    /// Configured session timeout.
    pub timeout: Duration,

    /// Sessions created since the registry was built.
    pub created: u64,

    /// Sessions evicted by the reaper.
    pub expired: u64,

    /// Sessions removed through [`SessionRegistry::invalidate`].
    pub invalidated: u64,
}

/// Process-wide owner of all live sessions and the reaper loop.
///
/// Cloning is cheap and every clone refers to the same registry.
///
/// ```rust,ignore
/// let registry = SessionRegistry::new(RegistryConfig::default())?;
/// let refresh = registry.start()?;
///
/// let resolved = registry.resolve(cookie.as_deref())?;
/// resolved.session.put_value("cart", json!(["item1"]));
/// if let Some(cookie) = resolved.cookie(Some(host)) {
///     response.headers_mut().insert(SET_COOKIE, cookie.to_string().parse()?);
/// }
/// refresh.refresh(resolved.id())?;
/// ```
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// Create a registry. The reaper is not running until [`start`](Self::start).
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;

        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let inner = RegistryInner {
            sessions: RwLock::new(HashMap::new()),
            timeout_millis: config.timeout_millis(),
            cookie_name: Arc::from(config.cookie_name.as_str()),
            config,
            refresh_tx,
            state: AtomicU8::new(STATE_IDLE),
            lifecycle: Mutex::new(Lifecycle::Idle { refresh_rx }),
            created: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Start the reaper on the configured interval and return the refresh
    /// handle. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<RefreshHandle> {
        tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let ticker = IntervalTicker::new(self.inner.config.reap_interval);
        self.start_with_ticker(ticker)
    }

    /// Start the reaper driven by a custom tick source.
    pub fn start_with_ticker<T: Ticker>(&self, ticker: T) -> Result<RefreshHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let mut lifecycle = self.inner.lifecycle.lock();
        let refresh_rx = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle { refresh_rx } => refresh_rx,
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                return Err(Error::AlreadyStarted);
            }
            Lifecycle::Stopped => return Err(Error::ShutDown),
        };

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(reaper::run(
            Arc::downgrade(&self.inner),
            ticker,
            refresh_rx,
            cancel.clone(),
        ));
        *lifecycle = Lifecycle::Running { cancel, handle };
        self.inner.state.store(STATE_RUNNING, Ordering::Release);

        info!(
            timeout_secs = self.inner.config.timeout.as_secs(),
            reap_interval_ms = self.inner.config.reap_interval.as_millis() as u64,
            touch_on_access = self.inner.config.touch_on_access,
            "Session registry started"
        );

        Ok(self.refresh_handle())
    }

    /// Another send handle for the refresh channel.
    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle::new(self.inner.refresh_tx.clone())
    }

    /// Resolve the session for a request.
    ///
    /// A missing, malformed, unknown or expired identifier creates a new
    /// session (`is_new = true`). A live identifier returns the existing
    /// session. Fails if the reaper was never started or has been shut down.
    pub fn resolve(&self, cookie: Option<&str>) -> Result<Resolved> {
        self.inner.ensure_running()?;

        if let Some(session_id) = cookie.filter(|value| id::is_well_formed(value)) {
            let existing = self.inner.sessions.read().get(session_id).cloned();
            if let Some(session) = existing {
                trace!(session_id = %session_id, "Session resolved");
                if self.inner.config.touch_on_access {
                    // Only fails once the reaper is gone, when refreshing is moot.
                    let _ = self.inner.refresh_tx.send(session_id.to_string());
                }
                return Ok(Resolved {
                    session,
                    is_new: false,
                    cookie_name: Arc::clone(&self.inner.cookie_name),
                });
            }
            debug!(session_id = %session_id, "Unknown session id presented, creating new session");
        } else if cookie.is_some() {
            debug!("Malformed session cookie ignored, creating new session");
        }

        Ok(Resolved {
            session: self.inner.create()?,
            is_new: true,
            cookie_name: Arc::clone(&self.inner.cookie_name),
        })
    }

    /// Look up a live session without creating one.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.read().get(session_id).cloned()
    }

    /// Check if a session is live.
    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.read().contains_key(session_id)
    }

    /// Remove a session immediately, e.g. on logout.
    ///
    /// Returns `true` if the session existed.
    pub fn invalidate(&self, session_id: &str) -> bool {
        let removed = self.inner.sessions.write().remove(session_id);
        match removed {
            Some(session) => {
                session.expire();
                self.inner.invalidated.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = %session_id, "Session invalidated");
                true
            }
            None => false,
        }
    }

    /// Reset a session's lifetime synchronously, bypassing the channel.
    pub fn refresh(&self, session_id: &str) -> bool {
        self.inner.refresh(session_id)
    }

    /// Run one sweep by hand, charging every session `elapsed`.
    ///
    /// Returns the number of sessions evicted.
    pub fn sweep(&self, elapsed: Duration) -> usize {
        self.inner.sweep(elapsed)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Check if there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.read().is_empty()
    }

    /// Identifiers of all live sessions.
    pub fn session_ids(&self) -> Vec<String> {
        self.inner.sessions.read().keys().cloned().collect()
    }

    /// The registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Check whether the reaper is running.
    pub fn is_running(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    /// Registry statistics.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            sessions: self.len(),
            timeout: self.inner.config.timeout,
            created: self.inner.created.load(Ordering::Relaxed),
            expired: self.inner.expired.load(Ordering::Relaxed),
            invalidated: self.inner.invalidated.load(Ordering::Relaxed),
        }
    }

    /// Stop the reaper and drop every session.
    ///
    /// Later calls to [`resolve`](Self::resolve) fail with [`Error::ShutDown`].
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        let running = {
            let mut lifecycle = self.inner.lifecycle.lock();
            self.inner.state.store(STATE_STOPPED, Ordering::Release);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running { cancel, handle } => Some((cancel, handle)),
                Lifecycle::Idle { .. } | Lifecycle::Stopped => None,
            }
        };

        if let Some((cancel, handle)) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Session reaper task ended abnormally");
            }
        }

        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.inner.sessions.write();
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in &drained {
            session.expire();
        }

        info!(dropped = drained.len(), "Session registry shut down");
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish()
    }
}
