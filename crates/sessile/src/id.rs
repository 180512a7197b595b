//! Session identifier generation.
//!
//! Identifiers are 64-character lowercase hex strings. They are bearer
//! tokens, not secrets with any cryptographic binding to the session data.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of every generated identifier.
pub const SESSION_ID_LEN: usize = 64;

/// Strategy used to produce new session identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Hash of the hashed wall-clock nanos concatenated with a hashed
    /// random 63-bit integer.
    #[default]
    Hashed,
    /// 32 bytes straight from the thread-local CSPRNG.
    Random,
}

impl IdStrategy {
    /// Produce a new identifier with this strategy.
    pub fn generate(self) -> String {
        match self {
            Self::Hashed => generate_id(),
            Self::Random => generate_random_id(),
        }
    }
}

/// Generate an identifier from timestamp and random entropy.
///
/// Both inputs are hashed independently, the hex digests are concatenated,
/// and the concatenation is hashed again.
pub fn generate_id() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let random: u64 = rand::rng().random::<u64>() >> 1;

    let combined = format!(
        "{}{}",
        hex_digest(nanos.to_string().as_bytes()),
        hex_digest(random.to_string().as_bytes())
    );
    hex_digest(combined.as_bytes())
}

/// Generate an identifier directly from the CSPRNG.
pub fn generate_random_id() -> String {
    let mut bytes = [0u8; SESSION_ID_LEN / 2];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Check whether a presented cookie value could be a generated identifier.
pub fn is_well_formed(id: &str) -> bool {
    id.len() == SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn hex_digest(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}
