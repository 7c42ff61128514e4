use crate::config::StatusCodes;
use crate::link_store::{LinkStore, StoreError, normalize_link};
use crate::runner::FuzzResult;
use log::debug;

/// Decides which fuzz results become links.
pub trait ResultFilter {
    /// Folds accepted results into `store` and returns the links that were new,
    /// in the fuzzer's result order.
    fn apply(
        &self,
        results: &[FuzzResult],
        store: &mut LinkStore,
    ) -> Result<Vec<String>, StoreError>;
}

/// Accepts results whose status code is in a configured set.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    accepted: StatusCodes,
}

impl StatusFilter {
    pub fn new(accepted: StatusCodes) -> Self {
        Self { accepted }
    }

    pub fn accepts(&self, result: &FuzzResult) -> bool {
        self.accepted.contains(result.status)
    }
}

impl ResultFilter for StatusFilter {
    fn apply(
        &self,
        results: &[FuzzResult],
        store: &mut LinkStore,
    ) -> Result<Vec<String>, StoreError> {
        let mut new_links = Vec::new();
        for result in results {
            if !self.accepts(result) {
                debug!("Discarding {} (status {})", result.input, result.status);
                continue;
            }
            if store.insert(&result.input)? {
                new_links.push(normalize_link(&result.input).to_string());
            }
        }
        Ok(new_links)
    }
}
