//! Parallel dispatch of one chunk's oracle calls over a bounded worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use reviewrate_ai::{OracleError, RatingOracle, RatingRequest};
use reviewrate_core::{Verdict, WorkItem};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// One item's outcome, paired back with the item that produced it.
pub type Outcome = (WorkItem, Result<Verdict, OracleError>);

/// Fans a chunk out to the oracle with at most `workers` calls in flight.
///
/// Completion order is arbitrary; outcomes are matched back to their items by
/// position, never by arrival. A failing or panicking call only affects its
/// own item.
pub struct Dispatcher {
    oracle: Arc<dyn RatingOracle>,
    workers: usize,
}

impl Dispatcher {
    pub fn new(oracle: Arc<dyn RatingOracle>, workers: usize) -> Self {
        Self {
            oracle,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Rate every item and return the outcomes in input order.
    pub async fn dispatch(&self, items: Vec<WorkItem>, product_line: &str) -> Vec<Outcome> {
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut slots = HashMap::with_capacity(items.len());

        for (idx, item) in items.iter().enumerate() {
            let request = RatingRequest::for_item(item, product_line);
            let oracle = Arc::clone(&self.oracle);
            let permits = Arc::clone(&permits);
            let handle = tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return Err(OracleError::Unknown(format!("worker pool closed: {e}"))),
                };
                oracle.rate(&request).await
            });
            slots.insert(handle.id(), idx);
        }

        let mut results: Vec<Option<Result<Verdict, OracleError>>> = vec![None; items.len()];
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    warn!(error = %e, "oracle call did not complete");
                    (e.id(), Err(OracleError::Unknown(format!("oracle task failed: {e}"))))
                }
            };
            if let Some(&idx) = slots.get(&id) {
                results[idx] = Some(outcome);
            }
        }
        debug!(items = items.len(), workers = self.workers, "chunk dispatched");

        items
            .into_iter()
            .zip(results)
            .map(|(item, outcome)| {
                let outcome = outcome
                    .unwrap_or_else(|| Err(OracleError::Unknown("no outcome recorded".into())));
                (item, outcome)
            })
            .collect()
    }
}

/// Number of chunks needed for `len` items.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedOracle, work_item};
    use std::time::Duration;

    fn items(ids: &[&str]) -> Vec<WorkItem> {
        ids.iter().map(|id| work_item("001", id)).collect()
    }

    #[tokio::test]
    async fn outcomes_follow_input_order() {
        // Earlier items finish last.
        let oracle = ScriptedOracle::new()
            .answer("A", "[1, a]")
            .answer("B", "[2, b]")
            .answer("C", "[3, c]")
            .delay("A", Duration::from_millis(60))
            .delay("B", Duration::from_millis(30));
        let dispatcher = Dispatcher::new(Arc::new(oracle), 3);

        let out = dispatcher.dispatch(items(&["A", "B", "C"]), "Openers").await;
        let pairs: Vec<(&str, &str)> = out
            .iter()
            .map(|(item, r)| (item.identity.item_id.as_str(), r.as_ref().unwrap().text.as_str()))
            .collect();
        assert_eq!(pairs, vec![("A", "[1, a]"), ("B", "[2, b]"), ("C", "[3, c]")]);
    }

    #[tokio::test]
    async fn in_flight_calls_never_exceed_workers() {
        let mut oracle = ScriptedOracle::new();
        for id in ["A", "B", "C", "D", "E", "F"] {
            oracle = oracle.delay(id, Duration::from_millis(20));
        }
        let oracle = Arc::new(oracle);
        let dispatcher = Dispatcher::new(oracle.clone(), 2);

        let out = dispatcher
            .dispatch(items(&["A", "B", "C", "D", "E", "F"]), "Openers")
            .await;
        assert_eq!(out.len(), 6);
        assert_eq!(oracle.calls(), 6);
        assert_eq!(oracle.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn failures_stay_with_their_item() {
        let oracle = ScriptedOracle::new()
            .fail("B", OracleError::Network("connection refused".into()))
            .panic_on("C");
        let dispatcher = Dispatcher::new(Arc::new(oracle), 4);

        let out = dispatcher.dispatch(items(&["A", "B", "C", "D"]), "Openers").await;
        assert!(out[0].1.is_ok());
        assert!(matches!(out[1].1, Err(OracleError::Network(_))));
        assert!(matches!(out[2].1, Err(OracleError::Unknown(_))));
        assert!(out[3].1.is_ok());
        assert_eq!(out[2].0.identity.item_id, "C");
    }

    #[tokio::test]
    async fn zero_workers_still_makes_progress() {
        let dispatcher = Dispatcher::new(Arc::new(ScriptedOracle::new()), 0);
        assert_eq!(dispatcher.workers(), 1);
        let out = dispatcher.dispatch(items(&["A"]), "Openers").await;
        assert!(out[0].1.is_ok());
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(0, 20), 0);
        assert_eq!(chunk_count(3, 2), 2);
        assert_eq!(chunk_count(40, 20), 2);
        assert_eq!(chunk_count(41, 20), 3);
    }
}
