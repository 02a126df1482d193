//! Depth renderbuffer pooling keyed by `(width, height)`.
//!
//! Render-to-texture needs a depth attachment whose only compatibility
//! requirement is its dimensions: depth contents are transient per draw,
//! so one renderbuffer can back every render target of a given size. The
//! pool holds at most one live renderbuffer per distinct `(width,
//! height)` key and retires entries that go unused past an idle
//! threshold.
//!
//! The pool is pure bookkeeping: handles go in and come out, and the
//! caller performs the actual GL allocation and deletion. Eviction is a
//! lazy sweep driven by the caller (on access or explicitly), not a
//! timer per entry, so an idle application holds no timer state. There
//! is no capacity bound; the map grows by one entry per distinct size
//! ever requested.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default idle period after which a pooled renderbuffer is evicted.
pub const DEFAULT_POOL_TTL: Duration = Duration::from_secs(60);

struct PoolEntry {
    renderbuffer: glow::Renderbuffer,
    last_used: Instant,
}

/// Pool of depth renderbuffers shared across render-to-texture calls.
///
/// Owned by the [`GpuContext`](crate::GpuContext) that allocated the
/// renderbuffers; never shared across contexts. Cooperative
/// single-threaded use only.
pub struct DepthBufferPool {
    entries: HashMap<(u32, u32), PoolEntry>,
    ttl: Duration,
}

impl DepthBufferPool {
    /// Creates an empty pool with the given idle eviction threshold.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Number of live pooled renderbuffers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no renderbuffers are pooled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current idle eviction threshold.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Changes the idle eviction threshold for subsequent sweeps.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// Looks up the renderbuffer for `(width, height)`, refreshing its
    /// idle timestamp. Returns `None` on a miss; the caller then
    /// allocates one and registers it with [`DepthBufferPool::insert`].
    pub fn checkout(&mut self, width: u32, height: u32, now: Instant) -> Option<glow::Renderbuffer> {
        let entry = self.entries.get_mut(&(width, height))?;
        entry.last_used = now;
        Some(entry.renderbuffer)
    }

    /// Registers a freshly allocated renderbuffer under `(width,
    /// height)`.
    ///
    /// Returns the previous renderbuffer handle if the key was already
    /// occupied, which the caller must delete: the pool keeps at most
    /// one renderbuffer per key.
    pub fn insert(
        &mut self,
        width: u32,
        height: u32,
        renderbuffer: glow::Renderbuffer,
        now: Instant,
    ) -> Option<glow::Renderbuffer> {
        self.entries
            .insert(
                (width, height),
                PoolEntry {
                    renderbuffer,
                    last_used: now,
                },
            )
            .map(|prev| prev.renderbuffer)
    }

    /// Removes every entry whose idle time at `now` meets or exceeds
    /// the TTL and returns their handles for the caller to delete.
    pub fn evict_stale(&mut self, now: Instant) -> Vec<glow::Renderbuffer> {
        let ttl = self.ttl;
        let stale: Vec<(u32, u32)> = self
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_used) >= ttl)
            .map(|(&k, _)| k)
            .collect();
        stale
            .into_iter()
            .filter_map(|k| self.entries.remove(&k))
            .map(|e| e.renderbuffer)
            .collect()
    }

    /// Removes every entry unconditionally and returns the handles for
    /// deletion. Used when the owning context is torn down.
    pub fn drain_all(&mut self) -> Vec<glow::Renderbuffer> {
        self.entries
            .drain()
            .map(|(_, e)| e.renderbuffer)
            .collect()
    }
}

impl Default for DepthBufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn rb(id: u32) -> glow::Renderbuffer {
        glow::NativeRenderbuffer(NonZeroU32::new(id).unwrap())
    }

    fn t0() -> Instant {
        Instant::now()
    }

    #[test]
    fn checkout_misses_on_empty_pool() {
        let mut pool = DepthBufferPool::default();
        assert_eq!(pool.checkout(256, 256, t0()), None);
        assert!(pool.is_empty());
    }

    #[test]
    fn same_dimensions_reuse_the_same_renderbuffer() {
        let mut pool = DepthBufferPool::default();
        let now = t0();
        pool.insert(256, 256, rb(1), now);
        assert_eq!(pool.checkout(256, 256, now), Some(rb(1)));
        assert_eq!(pool.checkout(256, 256, now), Some(rb(1)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn different_dimensions_get_distinct_entries() {
        let mut pool = DepthBufferPool::default();
        let now = t0();
        pool.insert(256, 256, rb(1), now);
        pool.insert(512, 512, rb(2), now);
        assert_eq!(pool.checkout(256, 256, now), Some(rb(1)));
        assert_eq!(pool.checkout(512, 512, now), Some(rb(2)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn transposed_dimensions_are_distinct_keys() {
        let mut pool = DepthBufferPool::default();
        let now = t0();
        pool.insert(128, 64, rb(1), now);
        assert_eq!(pool.checkout(64, 128, now), None);
    }

    #[test]
    fn insert_returns_displaced_handle_for_occupied_key() {
        let mut pool = DepthBufferPool::default();
        let now = t0();
        assert_eq!(pool.insert(256, 256, rb(1), now), None);
        assert_eq!(pool.insert(256, 256, rb(2), now), Some(rb(1)));
        assert_eq!(pool.len(), 1, "at most one renderbuffer per key");
        assert_eq!(pool.checkout(256, 256, now), Some(rb(2)));
    }

    #[test]
    fn idle_entries_are_evicted_at_ttl() {
        let mut pool = DepthBufferPool::new(Duration::from_secs(60));
        let start = t0();
        pool.insert(256, 256, rb(1), start);
        let evicted = pool.evict_stale(start + Duration::from_secs(60));
        assert_eq!(evicted, vec![rb(1)]);
        assert!(pool.is_empty());
    }

    #[test]
    fn fresh_entries_survive_a_sweep() {
        let mut pool = DepthBufferPool::new(Duration::from_secs(60));
        let start = t0();
        pool.insert(256, 256, rb(1), start);
        let evicted = pool.evict_stale(start + Duration::from_secs(59));
        assert!(evicted.is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn checkout_refreshes_the_idle_clock() {
        let mut pool = DepthBufferPool::new(Duration::from_secs(60));
        let start = t0();
        pool.insert(256, 256, rb(1), start);

        // Touch at t+45; at t+80 the entry is only 35s idle.
        let touched = start + Duration::from_secs(45);
        assert_eq!(pool.checkout(256, 256, touched), Some(rb(1)));
        let evicted = pool.evict_stale(start + Duration::from_secs(80));
        assert!(evicted.is_empty(), "refreshed entry must not be evicted");

        // Without further touches it goes stale at t+105.
        let evicted = pool.evict_stale(start + Duration::from_secs(105));
        assert_eq!(evicted, vec![rb(1)]);
    }

    #[test]
    fn sweep_evicts_only_stale_entries() {
        let mut pool = DepthBufferPool::new(Duration::from_secs(60));
        let start = t0();
        pool.insert(256, 256, rb(1), start);
        pool.insert(512, 512, rb(2), start + Duration::from_secs(30));

        let evicted = pool.evict_stale(start + Duration::from_secs(70));
        assert_eq!(evicted, vec![rb(1)], "only the older entry is stale");
        assert_eq!(pool.len(), 1);
        assert_eq!(
            pool.checkout(512, 512, start + Duration::from_secs(70)),
            Some(rb(2))
        );
    }

    #[test]
    fn eviction_then_reinsert_uses_the_new_handle() {
        let mut pool = DepthBufferPool::new(Duration::from_secs(60));
        let start = t0();
        pool.insert(256, 256, rb(1), start);
        pool.evict_stale(start + Duration::from_secs(120));
        assert_eq!(pool.checkout(256, 256, start + Duration::from_secs(120)), None);

        pool.insert(256, 256, rb(9), start + Duration::from_secs(120));
        assert_eq!(
            pool.checkout(256, 256, start + Duration::from_secs(121)),
            Some(rb(9))
        );
    }

    #[test]
    fn set_ttl_applies_to_subsequent_sweeps() {
        let mut pool = DepthBufferPool::new(Duration::from_secs(60));
        let start = t0();
        pool.insert(256, 256, rb(1), start);
        pool.set_ttl(Duration::from_secs(5));
        let evicted = pool.evict_stale(start + Duration::from_secs(6));
        assert_eq!(evicted, vec![rb(1)]);
    }

    #[test]
    fn drain_all_returns_every_handle() {
        let mut pool = DepthBufferPool::default();
        let now = t0();
        pool.insert(1, 1, rb(1), now);
        pool.insert(2, 2, rb(2), now);
        pool.insert(3, 3, rb(3), now);
        let drained: std::collections::HashSet<_> = pool.drain_all().into_iter().collect();
        assert_eq!(drained, [rb(1), rb(2), rb(3)].into_iter().collect());
        assert!(pool.is_empty());
    }

    #[test]
    fn pool_has_no_capacity_bound() {
        let mut pool = DepthBufferPool::default();
        let now = t0();
        for i in 1..=64u32 {
            pool.insert(i, i, rb(i), now);
        }
        assert_eq!(pool.len(), 64);
    }
}
