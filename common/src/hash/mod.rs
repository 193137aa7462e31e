use ahash::AHashMap;
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

pub type FastHashMap<K, V> = AHashMap<K, V>;

/// Stable 64-bit hash of a byte slice. Unlike `FastHashMap` keys, the result
/// does not depend on a per-process random seed.
pub fn fast_hash64(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Streaming variant of [`fast_hash64`].
pub type StableHasher = Xxh3;

pub fn new_stable_hasher() -> StableHasher {
    Xxh3::new()
}
