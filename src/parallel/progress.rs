//! Progress tracking for dispatched batches

use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Thread-safe progress tracker shared by the dispatcher and its observers
pub struct ProgressTracker {
    sender: broadcast::Sender<ProgressUpdate>,
    start_time: Mutex<Option<Instant>>,

    total: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    bytes_written: AtomicU64,
}

/// Snapshot of a batch in progress
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    pub total_items: usize,
    pub completed_items: usize,
    pub failed_items: usize,
    pub in_flight: usize,
    /// Highest number of items observed running at once
    pub peak_in_flight: usize,
    pub bytes_written: u64,
    pub elapsed_time: Duration,
    pub estimated_remaining: Option<Duration>,
    pub items_per_second: f64,
    pub completion_percentage: f64,
}

/// Progress update event
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Started {
        total_items: usize,
    },
    ItemStarted {
        label: String,
    },
    ItemCompleted {
        label: String,
        success: bool,
        elapsed: Duration,
    },
    BatchCompleted {
        final_state: ProgressState,
    },
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);

        Self {
            sender,
            start_time: Mutex::new(None),
            total: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Reset counters and start tracking a batch of `total_items`
    pub fn start(&self, total_items: usize) {
        *self.start_time.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        self.total.store(total_items, Ordering::Relaxed);
        self.in_flight.store(0, Ordering::Relaxed);
        self.peak_in_flight.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);

        let _ = self.sender.send(ProgressUpdate::Started { total_items });

        info!("Started progress tracking for {} items", total_items);
    }

    /// Record that an item has been admitted and is running
    pub fn start_item(&self, label: &str) {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let _ = self.sender.send(ProgressUpdate::ItemStarted {
            label: label.to_string(),
        });

        debug!("Started item: {} ({} in flight)", label, running);
    }

    /// Record that an item has finished, successfully or not
    pub fn finish_item(&self, label: &str, success: bool, elapsed: Duration) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let _ = self.sender.send(ProgressUpdate::ItemCompleted {
            label: label.to_string(),
            success,
            elapsed,
        });

        debug!("Finished item: {} (success: {})", label, success);
    }

    /// Add to the running total of bytes written
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Number of items currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of items running at once since [`start`](Self::start)
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Get current progress state
    pub fn get_state(&self) -> ProgressState {
        let elapsed = self
            .start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|start| start.elapsed())
            .unwrap_or_default();

        let mut state = ProgressState {
            total_items: self.total.load(Ordering::Relaxed),
            completed_items: self.completed.load(Ordering::Relaxed),
            failed_items: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            elapsed_time: elapsed,
            ..ProgressState::default()
        };

        let processed = state.processed_items();
        if state.total_items > 0 {
            state.completion_percentage = (processed as f64 / state.total_items as f64) * 100.0;
        }

        if elapsed.as_secs_f64() > 0.0 {
            state.items_per_second = processed as f64 / elapsed.as_secs_f64();

            if processed > 0 && state.total_items > processed {
                let remaining = (state.total_items - processed) as f64;
                let per_item = elapsed.as_secs_f64() / processed as f64;
                state.estimated_remaining = Some(Duration::from_secs_f64(remaining * per_item));
            }
        }

        state
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    /// Mark batch as completed
    pub fn complete_batch(&self) {
        let final_state = self.get_state();

        info!(
            "Batch completed: {}/{} items successful in {:.2}s (peak concurrency {})",
            final_state.completed_items,
            final_state.total_items,
            final_state.elapsed_time.as_secs_f64(),
            final_state.peak_in_flight
        );

        let _ = self.sender.send(ProgressUpdate::BatchCompleted { final_state });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressState {
    pub fn processed_items(&self) -> usize {
        self.completed_items + self.failed_items
    }

    /// Get human-readable completion status
    pub fn status_text(&self) -> String {
        if self.total_items > 0 && self.processed_items() >= self.total_items {
            "Completed".to_string()
        } else {
            format!(
                "{}/{} items processed ({} running)",
                self.processed_items(),
                self.total_items,
                self.in_flight
            )
        }
    }

    /// Get estimated time remaining as human-readable string
    pub fn eta_text(&self) -> String {
        match self.estimated_remaining {
            Some(duration) => {
                let seconds = duration.as_secs();
                if seconds < 60 {
                    format!("{}s", seconds)
                } else if seconds < 3600 {
                    format!("{}m {}s", seconds / 60, seconds % 60)
                } else {
                    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
                }
            }
            None => "Unknown".to_string(),
        }
    }

    /// Get processing speed as human-readable string
    pub fn speed_text(&self) -> String {
        if self.items_per_second >= 1.0 {
            format!("{:.1} items/sec", self.items_per_second)
        } else if self.items_per_second > 0.0 {
            format!("{:.1} sec/item", 1.0 / self.items_per_second)
        } else {
            "Unknown".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_tracker_basic() {
        let tracker = ProgressTracker::new();

        tracker.start(10);
        let state = tracker.get_state();
        assert_eq!(state.total_items, 10);
        assert_eq!(state.completed_items, 0);

        tracker.start_item("a.gif");
        assert_eq!(tracker.in_flight(), 1);
        tracker.finish_item("a.gif", true, Duration::from_millis(5));

        let state = tracker.get_state();
        assert_eq!(state.completed_items, 1);
        assert_eq!(state.in_flight, 0);
        assert_eq!(state.completion_percentage, 10.0);
    }

    #[test]
    fn test_peak_in_flight() {
        let tracker = ProgressTracker::new();
        tracker.start(3);

        tracker.start_item("a");
        tracker.start_item("b");
        tracker.finish_item("a", true, Duration::ZERO);
        tracker.start_item("c");
        tracker.finish_item("b", false, Duration::ZERO);
        tracker.finish_item("c", true, Duration::ZERO);

        let state = tracker.get_state();
        assert_eq!(state.peak_in_flight, 2);
        assert_eq!(state.completed_items, 2);
        assert_eq!(state.failed_items, 1);
        assert_eq!(state.status_text(), "Completed");
    }

    #[tokio::test]
    async fn test_progress_updates() {
        let tracker = ProgressTracker::new();
        let mut receiver = tracker.subscribe();

        tracker.start(5);
        let update = receiver.recv().await.unwrap();
        assert!(matches!(update, ProgressUpdate::Started { total_items: 5 }));

        tracker.start_item("test.gif");
        let update = receiver.recv().await.unwrap();
        assert!(matches!(update, ProgressUpdate::ItemStarted { .. }));

        tracker.finish_item("test.gif", false, Duration::from_millis(100));
        match receiver.recv().await.unwrap() {
            ProgressUpdate::ItemCompleted { label, success, .. } => {
                assert_eq!(label, "test.gif");
                assert!(!success);
            }
            other => panic!("Expected ItemCompleted, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_state_text() {
        let state = ProgressState {
            total_items: 10,
            completed_items: 3,
            failed_items: 1,
            in_flight: 2,
            items_per_second: 2.5,
            estimated_remaining: Some(Duration::from_secs(125)),
            ..ProgressState::default()
        };

        assert!(state.status_text().contains("4/10"));
        assert!(state.speed_text().contains("2.5"));
        assert_eq!(state.eta_text(), "2m 5s");
    }
}
