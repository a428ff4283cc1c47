//! Deterministic key provider for actors.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Provides deterministic Ed25519 keys derived from the master seed.
///
/// Every actor needs a reproducible signing key for orders. Keys are:
/// - Deterministic: same seed always produces the same keys
/// - Unique: each actor index gets a different key
/// - Isolated: growing the actor population does not change existing keys
pub struct DeterministicKeyProvider {
    master_seed: u64,
    key_cache: HashMap<u64, SigningKey>,
}

impl DeterministicKeyProvider {
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            key_cache: HashMap::new(),
        }
    }

    /// Generates or retrieves the signing key for an actor index.
    ///
    /// The key is derived from `master_seed` mixed with the index through
    /// two large odd multipliers, so indices decorrelate.
    pub fn actor_key(&mut self, actor_index: u64) -> SigningKey {
        if let Some(key) = self.key_cache.get(&actor_index) {
            return key.clone();
        }

        let actor_seed = self
            .master_seed
            .wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add(actor_index.wrapping_mul(0x517cc1b727220a95));

        let mut rng = ChaCha8Rng::seed_from_u64(actor_seed);
        let key = SigningKey::generate(&mut rng);
        self.key_cache.insert(actor_index, key.clone());
        key
    }

    pub fn actor_public_key(&mut self, actor_index: u64) -> VerifyingKey {
        self.actor_key(actor_index).verifying_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_actor_keys() {
        let mut provider1 = DeterministicKeyProvider::new(42);
        let mut provider2 = DeterministicKeyProvider::new(42);
        assert_eq!(
            provider1.actor_key(5).to_bytes(),
            provider2.actor_key(5).to_bytes()
        );
    }

    #[test]
    fn test_different_actors_different_keys() {
        let mut provider = DeterministicKeyProvider::new(42);
        let key0 = provider.actor_key(0);
        let key1 = provider.actor_key(1);
        assert_ne!(key0.to_bytes(), key1.to_bytes());
    }

    #[test]
    fn test_key_isolation() {
        // Adding more actors must not change existing keys.
        let mut provider1 = DeterministicKeyProvider::new(42);
        let mut provider2 = DeterministicKeyProvider::new(42);

        let keys1: Vec<_> = (0..3).map(|i| provider1.actor_key(i)).collect();
        let _extra: Vec<_> = (0..10).map(|i| provider2.actor_key(i)).collect();

        for (i, key) in keys1.iter().enumerate() {
            assert_eq!(key.to_bytes(), provider2.actor_key(i as u64).to_bytes());
        }
    }
}
