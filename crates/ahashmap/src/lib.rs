//! Hash map/set aliases shared by the bundler crates.
//!
//! Used for internal lookup tables whose iteration order never reaches
//! build output. Anything that is serialised or iterated to produce chunks
//! uses ordered collections instead.

#[cfg(feature = "ahash")]
pub type ARandomState = ahash::RandomState;
#[cfg(not(feature = "ahash"))]
pub type ARandomState = std::collections::hash_map::RandomState;

pub type AHashMap<K, V> = std::collections::HashMap<K, V, ARandomState>;
pub type AHashSet<K> = std::collections::HashSet<K, ARandomState>;

/// Creates an empty map sized for `capacity` entries.
pub fn map_with_capacity<K, V>(capacity: usize) -> AHashMap<K, V> {
    AHashMap::with_capacity_and_hasher(capacity, ARandomState::default())
}
