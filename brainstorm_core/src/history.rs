use crate::link_store::LinkStore;
use std::collections::HashSet;

/// Every candidate already handed to the fuzzer during this run.
#[derive(Debug, Default)]
pub struct CandidateHistory {
    tested: HashSet<String>,
}

impl CandidateHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops candidates that are known links, were tested before or repeat
    /// within the batch. Keeps the original order and records nothing.
    pub fn untested(&self, candidates: Vec<String>, store: &LinkStore) -> Vec<String> {
        let mut batch = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| !store.contains(c) && !self.tested.contains(c))
            .filter(|c| batch.insert(c.clone()))
            .collect()
    }

    /// Marks a batch as tested once the fuzzer has actually run it.
    pub fn record(&mut self, tested: &[String]) {
        self.tested.extend(tested.iter().cloned());
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.tested.contains(candidate)
    }

    pub fn len(&self) -> usize {
        self.tested.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tested.is_empty()
    }
}
