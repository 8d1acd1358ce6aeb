use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Optional cap on the number of leaf artifacts (or requests) a crawl run
/// may produce, shared by every policy and stage of that run.
///
/// The counter is owned by one crawl run and cloned into each collaborator;
/// callers must check it *before* doing further streaming work so that a
/// reached cap bounds wasted IO, not just output size.
#[derive(Debug, Clone)]
pub struct SampleBudget {
    cap: Option<u64>,
    taken: Arc<AtomicU64>,
}

impl SampleBudget {
    pub fn unlimited() -> Self {
        Self {
            cap: None,
            taken: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn capped(cap: u64) -> Self {
        Self {
            cap: Some(cap),
            taken: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn cap(&self) -> Option<u64> {
        self.cap
    }

    /// Claims one unit of the budget. Returns false once the cap is reached;
    /// unlimited budgets always succeed.
    pub fn try_take(&self) -> bool {
        match self.cap {
            None => {
                self.taken.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(cap) => self
                .taken
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |taken| {
                    (taken < cap).then_some(taken + 1)
                })
                .is_ok(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self.cap {
            None => false,
            Some(cap) => self.taken.load(Ordering::Relaxed) >= cap,
        }
    }

    /// The smaller of `default` and the remaining cap; used to size chunks
    /// so a sampled crawl never splits more than it will keep.
    pub fn chunk_size(&self, default: u64) -> u64 {
        match self.cap {
            Some(cap) if cap < default => cap.max(1),
            _ => default,
        }
    }
}

impl Default for SampleBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::SampleBudget;

    #[test]
    fn capped_budget_stops_at_cap() {
        let budget = SampleBudget::capped(2);
        assert!(budget.try_take());
        assert!(budget.try_take());
        assert!(!budget.try_take());
        assert!(budget.is_exhausted());
    }

    #[test]
    fn clones_share_the_counter() {
        let budget = SampleBudget::capped(1);
        let other = budget.clone();
        assert!(budget.try_take());
        assert!(!other.try_take());
    }

    #[test]
    fn unlimited_budget_never_exhausts() {
        let budget = SampleBudget::unlimited();
        for _ in 0..1000 {
            assert!(budget.try_take());
        }
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn chunk_size_is_capped_by_budget() {
        assert_eq!(SampleBudget::unlimited().chunk_size(100), 100);
        assert_eq!(SampleBudget::capped(5).chunk_size(100), 5);
        assert_eq!(SampleBudget::capped(500).chunk_size(100), 100);
    }
}
