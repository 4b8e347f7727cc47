// ── Memory: Eviction Policies ──────────────────────────────────────────────
//
// Each bounded tier has its own eviction rule, and the rule is a first-class
// value rather than code buried in the tier:
//
//   Tier            Policy                   Victim
//   ─────────────   ──────────────────────   ─────────────────────────────────
//   Short-term      FifoPolicy               oldest message
//   Long-term       LowestImpactPolicy       single lowest-impact interaction
//   Working procs   CompletedFirstPolicy     all completed, then oldest
//   (cache)         strict LRU in engine::cache
//
// `BoundedStore` appends first and then asks its policy for victims until the
// store is back within capacity, so a policy may evict the item that was just
// inserted (e.g. a brand-new interaction with the lowest impact).

use crate::atoms::types::{ActiveProcess, ProcessStatus, SignificantInteraction};

/// Chooses which items leave an over-capacity store.
pub trait EvictionPolicy<T>: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Return the indices (into `items`, insertion order) to evict.
    ///
    /// Called only when `items.len() > capacity`. Must return at least one
    /// valid index; duplicates are ignored.
    fn select_victims(&self, items: &[T], capacity: usize) -> Vec<usize>;
}

/// Oldest-first.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoPolicy;

impl<T> EvictionPolicy<T> for FifoPolicy {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn select_victims(&self, items: &[T], capacity: usize) -> Vec<usize> {
        (0..items.len().saturating_sub(capacity)).collect()
    }
}

/// Removes the single lowest-impact interaction per round (ties → oldest).
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestImpactPolicy;

impl EvictionPolicy<SignificantInteraction> for LowestImpactPolicy {
    fn name(&self) -> &'static str {
        "lowest_impact"
    }

    fn select_victims(&self, items: &[SignificantInteraction], _capacity: usize) -> Vec<usize> {
        let mut victim = None;
        let mut lowest = f32::INFINITY;
        for (i, item) in items.iter().enumerate() {
            if item.impact < lowest {
                lowest = item.impact;
                victim = Some(i);
            }
        }
        victim.into_iter().collect()
    }
}

/// Purges every completed process first; if none are completed, the oldest goes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletedFirstPolicy;

impl EvictionPolicy<ActiveProcess> for CompletedFirstPolicy {
    fn name(&self) -> &'static str {
        "completed_first"
    }

    fn select_victims(&self, items: &[ActiveProcess], _capacity: usize) -> Vec<usize> {
        let completed: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, p)| p.status == ProcessStatus::Completed)
            .map(|(i, _)| i)
            .collect();
        if completed.is_empty() {
            vec![0]
        } else {
            completed
        }
    }
}

/// Insertion-ordered store that never exceeds its capacity.
pub struct BoundedStore<T, P: EvictionPolicy<T>> {
    items: Vec<T>,
    capacity: usize,
    policy: P,
    evicted_total: usize,
}

impl<T, P: EvictionPolicy<T>> BoundedStore<T, P> {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize, policy: P) -> Self {
        Self {
            items: Vec::new(),
            capacity: capacity.max(1),
            policy,
            evicted_total: 0,
        }
    }

    /// Append, then evict until within capacity. Returns evicted items.
    pub fn push(&mut self, item: T) -> Vec<T> {
        self.items.push(item);
        self.enforce_capacity()
    }

    fn enforce_capacity(&mut self) -> Vec<T> {
        let mut evicted = Vec::new();
        while self.items.len() > self.capacity {
            let mut victims = self.policy.select_victims(&self.items, self.capacity);
            victims.retain(|&i| i < self.items.len());
            victims.sort_unstable();
            victims.dedup();
            if victims.is_empty() {
                // A policy that picks nothing would loop forever; fall back to FIFO.
                log::warn!(
                    "[memory::eviction] Policy '{}' selected no victims, evicting oldest",
                    self.policy.name()
                );
                victims.push(0);
            }
            for &i in victims.iter().rev() {
                evicted.push(self.items.remove(i));
            }
        }
        self.evicted_total += evicted.len();
        evicted
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of items evicted over the store's lifetime.
    pub fn evicted_total(&self) -> usize {
        self.evicted_total
    }

    /// Remove the first item matching `pred`.
    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let pos = self.items.iter().position(pred)?;
        Some(self.items.remove(pos))
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| pred(item))
    }

    pub fn find_mut(&mut self, pred: impl Fn(&T) -> bool) -> Option<&mut T> {
        self.items.iter_mut().find(|item| pred(item))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Change capacity; shrinking evicts per policy.
    pub fn resize(&mut self, capacity: usize) -> Vec<T> {
        self.capacity = capacity.max(1);
        self.enforce_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn interaction(id: &str, impact: f32) -> SignificantInteraction {
        SignificantInteraction {
            id: id.into(),
            timestamp: Utc::now(),
            summary: id.into(),
            impact,
            emotional_resonance: 0.0,
            topics: vec![],
        }
    }

    #[test]
    fn test_fifo_keeps_newest() {
        let mut store = BoundedStore::new(3, FifoPolicy);
        for i in 0..6 {
            store.push(i);
        }
        assert_eq!(store.items(), &[3, 4, 5]);
        assert_eq!(store.evicted_total(), 3);
    }

    #[test]
    fn test_lowest_impact_not_oldest() {
        let mut store = BoundedStore::new(2, LowestImpactPolicy);
        store.push(interaction("old-high", 0.9));
        store.push(interaction("mid-low", 0.1));
        let evicted = store.push(interaction("new-mid", 0.5));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, "mid-low");
        let ids: Vec<&str> = store.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["old-high", "new-mid"]);
    }

    #[test]
    fn test_lowest_impact_can_evict_new_item() {
        let mut store = BoundedStore::new(1, LowestImpactPolicy);
        store.push(interaction("keeper", 0.8));
        let evicted = store.push(interaction("weak", 0.2));
        assert_eq!(evicted[0].id, "weak");
        assert_eq!(store.items()[0].id, "keeper");
    }

    #[test]
    fn test_completed_first_purges_completed() {
        let mut store = BoundedStore::new(3, CompletedFirstPolicy);
        let mut a = ActiveProcess::new("a", "t");
        a.status = ProcessStatus::Running;
        let mut b = ActiveProcess::new("b", "t");
        b.status = ProcessStatus::Completed;
        let mut c = ActiveProcess::new("c", "t");
        c.status = ProcessStatus::Completed;
        store.push(a);
        store.push(b);
        store.push(c);
        let evicted = store.push(ActiveProcess::new("d", "t"));

        assert_eq!(evicted.len(), 2);
        let ids: Vec<&str> = store.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn test_completed_first_falls_back_to_oldest() {
        let mut store = BoundedStore::new(2, CompletedFirstPolicy);
        store.push(ActiveProcess::new("a", "t"));
        store.push(ActiveProcess::new("b", "t"));
        store.push(ActiveProcess::new("c", "t"));
        let ids: Vec<&str> = store.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_resize_shrink_applies_policy() {
        let mut store = BoundedStore::new(5, FifoPolicy);
        for i in 0..5 {
            store.push(i);
        }
        let evicted = store.resize(2);
        assert_eq!(evicted.len(), 3);
        assert_eq!(store.items(), &[3, 4]);
    }
}
