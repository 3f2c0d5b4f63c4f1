use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// Concurrent map with the same hasher, used for caches shared across threads.
pub type FastDashMap<K, V> = DashMap<K, V, FxBuildHasher>;

#[inline]
pub fn fast_hash_map_new<K, V>() -> FastHashMap<K, V> {
    rustc_hash::FxHashMap::default()
}

#[inline]
pub fn fast_dash_map_new<K: Eq + std::hash::Hash, V>() -> FastDashMap<K, V> {
    DashMap::with_hasher(FxBuildHasher)
}
