//! Update counters and staleness snapshots.
//!
//! Every entity type has a per-class [`UpdateCountHolder`]; relationship
//! attributes may carry their own. Mutation code bumps the relevant holders
//! before a change becomes visible to readers. A cached result records the
//! counter values it was read under in a [`StalenessSnapshot`] and is stale as
//! soon as any of them moves.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::Error;

/// Pool maps are swept for dead arrays once they grow past this size and
/// then again each time they double since the last sweep.
const POOL_PRUNE_THRESHOLD: usize = 1024;

/// Monotonic update counter.
#[derive(Debug)]
pub struct UpdateCountHolder {
    name: String,
    count: AtomicU64,
}

impl UpdateCountHolder {
    /// Create a holder starting at zero.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: AtomicU64::new(0),
        }
    }

    /// Name used in logs, usually the entity or attribute it guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bump the counter and return the new value.
    pub fn increment_update_count(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current counter value.
    pub fn update_count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// Counter values captured for a set of holders.
///
/// Both arrays are normally interned through an [`UpdateCountPool`], so many
/// cached queries over the same entity share one allocation.
#[derive(Debug, Clone)]
pub struct StalenessSnapshot {
    holders: Arc<[Arc<UpdateCountHolder>]>,
    counts: Arc<[u64]>,
}

impl StalenessSnapshot {
    /// Build a snapshot from parallel holder and count arrays.
    pub fn from_parts(
        holders: Arc<[Arc<UpdateCountHolder>]>,
        counts: Arc<[u64]>,
    ) -> Result<Self, Error> {
        if holders.len() != counts.len() {
            return Err(Error::Inconsistency(format!(
                "snapshot has {} holders but {} counts",
                holders.len(),
                counts.len()
            )));
        }
        Ok(Self { holders, counts })
    }

    /// Read the current value of every holder.
    pub fn capture(
        holders: Arc<[Arc<UpdateCountHolder>]>,
        pool: &UpdateCountPool,
    ) -> Result<Self, Error> {
        let counts: Vec<u64> = holders.iter().map(|h| h.update_count()).collect();
        let counts = pool.pooled_integer_array(&counts);
        Self::from_parts(holders, counts)
    }

    /// Read the current value of every holder without interning the arrays.
    pub fn read(holders: Vec<Arc<UpdateCountHolder>>) -> Result<Self, Error> {
        let counts: Vec<u64> = holders.iter().map(|h| h.update_count()).collect();
        Self::from_parts(Arc::from(holders), Arc::from(counts))
    }

    /// Union of both snapshots by holder identity.
    ///
    /// A holder tracked by both keeps the count captured in `self`, so a
    /// result derived from an older snapshot never looks fresher than it.
    pub fn merge(&self, other: &StalenessSnapshot) -> Result<Self, Error> {
        if other.holders.len() != other.counts.len() {
            return Err(Error::Inconsistency(format!(
                "merged snapshot has {} holders but {} counts",
                other.holders.len(),
                other.counts.len()
            )));
        }
        let mut holders = self.holders.to_vec();
        let mut counts = self.counts.to_vec();
        for (holder, &count) in other.holders.iter().zip(other.counts.iter()) {
            if !self.holders.iter().any(|tracked| Arc::ptr_eq(tracked, holder)) {
                holders.push(holder.clone());
                counts.push(count);
            }
        }
        if holders.len() == self.holders.len() {
            return Ok(self.clone());
        }
        Self::from_parts(Arc::from(holders), Arc::from(counts))
    }

    /// Whether any tracked counter has moved since capture.
    pub fn is_expired(&self) -> bool {
        self.holders
            .iter()
            .zip(self.counts.iter())
            .any(|(holder, &count)| holder.update_count() != count)
    }

    /// Whether every given holder is tracked by this snapshot.
    pub fn covers(&self, holders: &[Arc<UpdateCountHolder>]) -> bool {
        holders
            .iter()
            .all(|h| self.holders.iter().any(|tracked| Arc::ptr_eq(tracked, h)))
    }

    /// Tracked holders.
    pub fn holders(&self) -> &[Arc<UpdateCountHolder>] {
        &self.holders
    }

    /// Captured counts, parallel to [`holders`](Self::holders).
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of tracked holders.
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// Whether the snapshot tracks nothing.
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

/// Interning pool for holder and count arrays.
///
/// Entries are weak, so the pool never keeps an array alive on its own.
#[derive(Debug, Default)]
pub struct UpdateCountPool {
    holder_arrays: DashMap<Vec<usize>, Weak<[Arc<UpdateCountHolder>]>>,
    count_arrays: DashMap<Vec<u64>, Weak<[u64]>>,
    holder_arrays_pruned_at: AtomicUsize,
    count_arrays_pruned_at: AtomicUsize,
}

/// Drop dead entries once `map` has doubled since the last sweep.
fn prune_if_grown<K, V>(map: &DashMap<K, Weak<V>>, pruned_at: &AtomicUsize)
where
    K: Eq + std::hash::Hash,
    V: ?Sized,
{
    let len = map.len();
    let limit = POOL_PRUNE_THRESHOLD.max(pruned_at.load(Ordering::Relaxed).saturating_mul(2));
    if len <= limit {
        return;
    }
    map.retain(|_, weak| weak.strong_count() > 0);
    pruned_at.store(map.len(), Ordering::Relaxed);
}

impl UpdateCountPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a shared array equal to `holders`, keyed by holder identity.
    pub fn pooled_update_count_holders(
        &self,
        holders: Vec<Arc<UpdateCountHolder>>,
    ) -> Arc<[Arc<UpdateCountHolder>]> {
        let key: Vec<usize> = holders.iter().map(|h| Arc::as_ptr(h) as usize).collect();
        let pooled = match self.holder_arrays.entry(key) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(existing) => existing,
                None => {
                    let fresh: Arc<[Arc<UpdateCountHolder>]> = Arc::from(holders);
                    entry.insert(Arc::downgrade(&fresh));
                    fresh
                }
            },
            Entry::Vacant(entry) => {
                let fresh: Arc<[Arc<UpdateCountHolder>]> = Arc::from(holders);
                entry.insert(Arc::downgrade(&fresh));
                fresh
            }
        };
        prune_if_grown(&self.holder_arrays, &self.holder_arrays_pruned_at);
        pooled
    }

    /// Return a shared array equal to `counts`.
    pub fn pooled_integer_array(&self, counts: &[u64]) -> Arc<[u64]> {
        let pooled = match self.count_arrays.entry(counts.to_vec()) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(existing) => existing,
                None => {
                    let fresh: Arc<[u64]> = Arc::from(counts);
                    entry.insert(Arc::downgrade(&fresh));
                    fresh
                }
            },
            Entry::Vacant(entry) => {
                let fresh: Arc<[u64]> = Arc::from(counts);
                entry.insert(Arc::downgrade(&fresh));
                fresh
            }
        };
        prune_if_grown(&self.count_arrays, &self.count_arrays_pruned_at);
        pooled
    }

    /// Number of live and dead entries across both maps.
    pub fn len(&self) -> usize {
        self.holder_arrays.len() + self.count_arrays.len()
    }

    /// Whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
