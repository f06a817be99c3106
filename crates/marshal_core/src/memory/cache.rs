//! # Cached Handle Pool
//!
//! Per-category free lists of pre-created handles.
//!
//! ```text
//!  allocate(Body) ──► pool[Body] non-empty? ──yes──► pop, no round trip
//!                              │
//!                              no
//!                              ▼
//!                     refill(max + 1) on the worker (one blocking call)
//!                     return first, restock the rest
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::Rid;
use crate::error::{MarshalError, MarshalResult};

/// Counters for handle pool traffic.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Allocations served from a pool without a round trip.
    pub hits: AtomicU64,
    /// Allocations that needed a blocking refill.
    pub misses: AtomicU64,
    /// Prefill batches issued.
    pub prefills: AtomicU64,
    /// Handles created by refills and prefills.
    pub created: AtomicU64,
    /// Pooled handles handed back for destruction.
    pub released: AtomicU64,
}

impl CacheStats {
    /// Allocations served from a pool.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Allocations that cost a blocking round trip.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Prefill batches issued.
    #[must_use]
    pub fn prefills(&self) -> u64 {
        self.prefills.load(Ordering::Relaxed)
    }

    /// Handles created on behalf of the pools.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Handles released from the pools.
    #[must_use]
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

type FreeList = Arc<Mutex<VecDeque<Rid>>>;

/// Producer-side pools of fresh handles, one per category `K`.
///
/// The cache never creates or destroys anything itself. Callers pass the
/// creation step (usually a synchronous call to the worker) to
/// [`allocate`](Self::allocate) and [`prefill`](Self::prefill), and the
/// destruction step to [`release_all`](Self::release_all).
///
/// A category's free list stays locked while it is being refilled, so two
/// threads missing on the same category cost one round trip, not two.
///
/// ## Usage
///
/// ```rust,ignore
/// let cache = HandleCache::new(60);
///
/// let body = cache.allocate(Category::Body, |count| {
///     proxy.try_call_sync(move |server| (0..count).map(|_| server.body_create()).collect())
/// })?;
///
/// // Shutdown
/// cache.release_all(Category::Body, |rids| proxy.call(move |s| rids.into_iter().for_each(|r| s.free(r))));
/// ```
pub struct HandleCache<K> {
    pools: Mutex<HashMap<K, FreeList>>,
    max_size: usize,
    stats: CacheStats,
}

impl<K> HandleCache<K>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    /// Creates empty pools holding at most `max_size` handles each.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            max_size,
            stats: CacheStats::default(),
        }
    }

    /// Maximum handles kept per category.
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Handles currently pooled for `category`.
    #[must_use]
    pub fn available(&self, category: K) -> usize {
        self.free_list(category).lock().len()
    }

    /// Handles currently pooled across all categories.
    #[must_use]
    pub fn total_available(&self) -> usize {
        let lists: Vec<FreeList> = self.pools.lock().values().cloned().collect();
        lists.iter().map(|list| list.lock().len()).sum()
    }

    /// Traffic counters.
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Returns a fresh handle for `category`.
    ///
    /// Served from the pool when possible. Otherwise `refill(n)` is called
    /// once to create `max_size + 1` handles: the first is returned and the
    /// rest restock the pool.
    ///
    /// # Errors
    ///
    /// Propagates the refill error, or `HandleExhausted` if the refill
    /// produced no handles.
    pub fn allocate<F>(&self, category: K, refill: F) -> MarshalResult<Rid>
    where
        F: FnOnce(usize) -> MarshalResult<Vec<Rid>>,
    {
        let list = self.free_list(category);
        let mut pool = list.lock();

        if let Some(rid) = pool.pop_front() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(rid);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let batch = refill(self.max_size.saturating_add(1))?;
        self.stats.created.fetch_add(batch.len() as u64, Ordering::Relaxed);

        let mut batch = batch.into_iter();
        let Some(rid) = batch.next() else {
            return Err(MarshalError::HandleExhausted {
                category: format!("{category:?}"),
            });
        };
        pool.extend(batch);
        tracing::debug!(?category, pooled = pool.len(), "handle pool refilled");
        Ok(rid)
    }

    /// Tops `category` up to `max_size` with one `refill(n)` call.
    ///
    /// Returns the number of handles added; no call is made when the pool
    /// is already full.
    ///
    /// # Errors
    ///
    /// Propagates the refill error.
    pub fn prefill<F>(&self, category: K, refill: F) -> MarshalResult<usize>
    where
        F: FnOnce(usize) -> MarshalResult<Vec<Rid>>,
    {
        let list = self.free_list(category);
        let mut pool = list.lock();

        let missing = self.max_size.saturating_sub(pool.len());
        if missing == 0 {
            return Ok(0);
        }

        let batch = refill(missing)?;
        let added = batch.len();
        self.stats.prefills.fetch_add(1, Ordering::Relaxed);
        self.stats.created.fetch_add(added as u64, Ordering::Relaxed);
        pool.extend(batch);
        Ok(added)
    }

    /// Empties `category`, handing every pooled handle to `destroy`.
    ///
    /// `destroy` is not called when the pool is already empty. Returns
    /// the number of handles released.
    pub fn release_all<F>(&self, category: K, destroy: F) -> usize
    where
        F: FnOnce(Vec<Rid>),
    {
        let drained: Vec<Rid> = self.free_list(category).lock().drain(..).collect();
        let count = drained.len();
        if count > 0 {
            self.stats.released.fetch_add(count as u64, Ordering::Relaxed);
            tracing::debug!(?category, count, "handle pool released");
            destroy(drained);
        }
        count
    }

    fn free_list(&self, category: K) -> FreeList {
        let mut pools = self.pools.lock();
        Arc::clone(
            pools
                .entry(category)
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.max_size)))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashSet;

    fn minting(next: &Cell<u32>) -> impl FnMut(usize) -> MarshalResult<Vec<Rid>> + '_ {
        move |count| {
            Ok((0..count)
                .map(|_| {
                    let rid = Rid::new(next.get(), 0);
                    next.set(next.get() + 1);
                    rid
                })
                .collect())
        }
    }

    #[test]
    fn test_prefilled_pool_serves_without_refill() {
        let next = Cell::new(0);
        let mut mint = minting(&next);
        let cache = HandleCache::new(8);

        assert_eq!(cache.prefill("body", &mut mint).unwrap(), 8);
        assert_eq!(cache.available("body"), 8);

        for expected in 0..8 {
            let rid = cache
                .allocate("body", |_| panic!("pool should not refill"))
                .unwrap();
            assert_eq!(rid.index(), expected);
        }
        assert_eq!(cache.stats().hits(), 8);
        assert_eq!(cache.stats().misses(), 0);
    }

    #[test]
    fn test_ten_allocations_cost_one_round_trip() {
        let next = Cell::new(0);
        let mut mint = minting(&next);
        let round_trips = Cell::new(0);
        let cache = HandleCache::new(8);
        cache.prefill("body", &mut mint).unwrap();

        let mut seen = Vec::new();
        for _ in 0..10 {
            let rid = cache
                .allocate("body", |count| {
                    round_trips.set(round_trips.get() + 1);
                    mint(count)
                })
                .unwrap();
            seen.push(rid);
        }

        assert_eq!(round_trips.get(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.available("body"), 7);
        let unique: HashSet<Rid> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_zero_size_pool_round_trips_every_time() {
        let next = Cell::new(0);
        let mut mint = minting(&next);
        let cache = HandleCache::new(0);

        assert_eq!(cache.prefill("shape", &mut mint).unwrap(), 0);
        for _ in 0..3 {
            cache.allocate("shape", &mut mint).unwrap();
        }
        assert_eq!(cache.stats().misses(), 3);
        assert_eq!(cache.available("shape"), 0);
        assert_eq!(next.get(), 3);
    }

    #[test]
    fn test_empty_refill_is_exhaustion() {
        let cache = HandleCache::<&str>::new(4);
        let err = cache.allocate("area", |_| Ok(Vec::new())).unwrap_err();
        assert!(matches!(err, MarshalError::HandleExhausted { .. }));
    }

    #[test]
    fn test_release_all_drains_category() {
        let next = Cell::new(0);
        let mut mint = minting(&next);
        let cache = HandleCache::new(4);
        cache.prefill("space", &mut mint).unwrap();
        cache.prefill("area", &mut mint).unwrap();

        let mut destroyed = Vec::new();
        assert_eq!(cache.release_all("space", |rids| destroyed = rids), 4);
        assert_eq!(destroyed.len(), 4);
        assert_eq!(cache.available("space"), 0);
        assert_eq!(cache.total_available(), 4);

        assert_eq!(cache.release_all("space", |_| panic!("nothing to release")), 0);
    }

    #[test]
    fn test_unbounded_pool_size_does_not_overflow_refill() {
        let cache = HandleCache::new(usize::MAX);
        let requested = Cell::new(0);
        let rid = cache
            .allocate("body", |count| {
                requested.set(count);
                Ok(vec![Rid::new(0, 0)])
            })
            .unwrap();

        assert_eq!(rid, Rid::new(0, 0));
        assert_eq!(requested.get(), usize::MAX);
    }
}
