//! Bounded-concurrency dispatch of independent work items

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::progress::ProgressTracker;

/// Run `worker` over every item with at most `concurrency` items in flight.
///
/// Items are admitted in submission order; a new item starts only when a
/// running one finishes. The returned outcomes are index-aligned with
/// `items`. A failing or panicking item never stops the others. A
/// `concurrency` of zero is treated as one; a limit at or above the item
/// count runs every item at once.
pub async fn dispatch<T, R, E, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    tracker: Option<Arc<ProgressTracker>>,
    mut worker: F,
) -> Vec<Result<R, E>>
where
    T: fmt::Display,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: From<JoinError> + From<AcquireError> + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = Vec::with_capacity(items.len());

    debug!("Dispatching {} items with concurrency {}", items.len(), concurrency);

    for item in items {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(acquire_error) => {
                warn!("Could not admit {}: {}", item, acquire_error);
                tasks.push(tokio::spawn(async move { Err(E::from(acquire_error)) }));
                continue;
            }
        };

        let label = item.to_string();
        let tracker = tracker.clone();
        let work = worker(item);

        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let mut guard = InFlightGuard::enter(tracker, label);
            let outcome = work.await;
            guard.success = outcome.is_ok();
            outcome
        }));
    }

    futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(join_error) => {
                warn!("Dispatched task did not complete: {}", join_error);
                Err(E::from(join_error))
            }
        })
        .collect()
}

/// Reports an item to the tracker for as long as it runs.
///
/// Dropped before the permit is released, including when the worker panics.
struct InFlightGuard {
    tracker: Option<Arc<ProgressTracker>>,
    label: String,
    started: Instant,
    success: bool,
}

impl InFlightGuard {
    fn enter(tracker: Option<Arc<ProgressTracker>>, label: String) -> Self {
        if let Some(tracker) = &tracker {
            tracker.start_item(&label);
        }
        Self {
            tracker,
            label,
            started: Instant::now(),
            success: false,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(tracker) = &self.tracker {
            tracker.finish_item(&self.label, self.success, self.started.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use crate::error::AnimBatchError;

    fn tracked(total: usize) -> Arc<ProgressTracker> {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.start(total);
        tracker
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_limit() {
        let tracker = tracked(20);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = dispatch((0..20).collect(), 3, Some(Arc::clone(&tracker)), |i: usize| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, AnimBatchError>(i)
            }
        })
        .await;

        assert_eq!(outcomes.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(tracker.peak_in_flight(), 3);
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.get_state().completed_items, 20);
    }

    #[tokio::test]
    async fn test_limit_above_item_count_runs_all_at_once() {
        let tracker = tracked(4);
        // Every worker waits for all four, so this only finishes if none is held back
        let barrier = Arc::new(tokio::sync::Barrier::new(4));

        let run = dispatch((0..4).collect(), 10, Some(Arc::clone(&tracker)), |i: usize| {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                Ok::<_, AnimBatchError>(i)
            }
        });
        let outcomes = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("all items should run concurrently");

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert_eq!(tracker.peak_in_flight(), 4);
    }

    #[tokio::test]
    async fn test_outcomes_are_index_aligned() {
        // Later items finish first
        let outcomes = dispatch((0..8u64).collect(), 4, None, |i: u64| async move {
            tokio::time::sleep(Duration::from_millis(40 - i * 5)).await;
            Ok::<_, AnimBatchError>(i * 2)
        })
        .await;

        let values: Vec<u64> = outcomes.into_iter().map(|o| o.unwrap()).collect();
        assert_eq!(values, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let tracker = tracked(10);
        let outcomes = dispatch((0..10).collect(), 2, Some(Arc::clone(&tracker)), |i: usize| async move {
            if i % 2 == 1 {
                Err(AnimBatchError::transform(format!("item {} failed", i), None))
            } else {
                Ok(i)
            }
        })
        .await;

        assert_eq!(outcomes.len(), 10);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.is_ok(), i % 2 == 0);
        }
        let state = tracker.get_state();
        assert_eq!(state.completed_items, 5);
        assert_eq!(state.failed_items, 5);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcomes = dispatch(Vec::<usize>::new(), 5, None, |i: usize| async move {
            Ok::<_, AnimBatchError>(i)
        })
        .await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_single_slot_runs_in_submission_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        // Zero is treated as a single slot
        for concurrency in [1, 0] {
            order.lock().unwrap().clear();
            let outcomes = dispatch((0..6).collect(), concurrency, None, |i: usize| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(i);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok::<_, AnimBatchError>(i)
                }
            })
            .await;

            assert_eq!(outcomes.len(), 6);
            assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        }
    }

    #[tokio::test]
    async fn test_panicking_item_becomes_failure() {
        let tracker = tracked(4);
        let outcomes = dispatch((0..4).collect(), 2, Some(Arc::clone(&tracker)), |i: usize| async move {
            if i == 2 {
                panic!("worker blew up");
            }
            Ok::<_, AnimBatchError>(i)
        })
        .await;

        assert_eq!(outcomes.len(), 4);
        assert!(matches!(outcomes[2], Err(AnimBatchError::DispatchError { .. })));
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 3);
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.get_state().failed_items, 1);
    }
}
