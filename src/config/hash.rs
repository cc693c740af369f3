//! Configuration fingerprints.
//!
//! A fingerprint is a short, deterministic digest of the specs selected for
//! a run. It is printed in the plan header so two previews can be compared
//! at a glance.

use sha2::{Digest, Sha256};

use super::spec::SyncConfig;

/// Number of hex characters kept from the digest.
const FINGERPRINT_LEN: usize = 8;

/// Hasher for computing configuration fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the full SHA-256 digest of the named specs.
    ///
    /// Names are hashed in sorted order and unknown names are skipped, so
    /// the result does not depend on how the selection was written.
    #[must_use]
    pub fn hash_specs(&self, config: &SyncConfig, names: &[&str]) -> String {
        let mut sorted: Vec<&str> = names.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut hasher = Sha256::new();
        for name in sorted {
            let Some(params) = config.secrets.get(name) else {
                continue;
            };
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            // Map keys serialize sorted, which keeps this canonical.
            let canonical = serde_json::Value::Object(params.clone()).to_string();
            hasher.update(canonical.as_bytes());
            hasher.update([0u8]);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the short fingerprint shown to users.
    #[must_use]
    pub fn fingerprint(&self, config: &SyncConfig, names: &[&str]) -> String {
        let mut digest = self.hash_specs(config, names);
        digest.truncate(FINGERPRINT_LEN);
        digest
    }
}
