//! Cookie-keyed in-memory session store with TTL eviction.
//!
//! This crate provides:
//! - A [`SessionRegistry`] that resolves or creates sessions from a cookie value
//! - Per-session key/value state behind its own reader/writer lock
//! - A background reaper that charges every session on a fixed tick and
//!   evicts those whose remaining lifetime runs out
//! - Out-of-band refresh signals that restore a session's full lifetime
//!
//! # Example
//!
//! ```rust,ignore
//! use sessile::{RegistryConfig, SessionRegistry};
//!
//! let config = RegistryConfig::default()
//!     .with_timeout(Duration::from_secs(1800))
//!     .with_reap_interval(Duration::from_secs(5));
//!
//! let registry = SessionRegistry::new(config)?;
//! let refresh = registry.start()?;
//!
//! let resolved = registry.resolve(cookie_value)?;
//! resolved.session.put_value("cart", json!(["item1"]));
//! ```

mod config;
mod cookie;
mod error;
pub mod global;
mod id;
mod reaper;
mod registry;
mod session;

pub use config::{
    DEFAULT_COOKIE_NAME, DEFAULT_REAP_INTERVAL, DEFAULT_TIMEOUT, MAX_DURATION, RegistryConfig,
};
pub use cookie::{SessionCookie, session_id_from_cookie_header};
pub use error::{Error, Result};
pub use id::{IdStrategy, SESSION_ID_LEN, generate_id, generate_random_id, is_well_formed};
pub use reaper::{IntervalTicker, ManualTicker, RefreshHandle, TickTrigger, Ticker};
pub use registry::{RegistryStats, Resolved, SessionRegistry};
pub use session::Session;
pub use serde_json::Value;
