//! Progress reporting and cancellation for long-running algorithms.
//!
//! Algorithms report progress through a [`Progress`] callback and poll its
//! cancellation flag between iterations. Cancellation is cooperative: a
//! running iteration always completes before the flag is honored.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use wlop::algo::Progress;
//!
//! let cancel = Arc::new(AtomicBool::new(false));
//! let progress = Progress::new(|current, total, message| {
//!     println!("[{}/{}] {}", current, total, message);
//! })
//! .with_cancel_flag(cancel.clone());
//!
//! assert!(!progress.is_cancelled());
//! cancel.store(true, Ordering::Relaxed);
//! assert!(progress.is_cancelled());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A progress callback that receives updates during long-running operations.
///
/// The callback receives:
/// - `current`: Current step (0-based)
/// - `total`: Total number of steps
/// - `message`: Description of the current operation
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
            cancel: None,
        }
    }

    /// Attach a cancellation flag. Setting the flag to `true` asks the
    /// running algorithm to stop at the next iteration boundary.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Create a no-op progress reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_report_forwards_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::new(move |c, t, m| {
            sink.lock().unwrap().push((c, t, m.to_string()));
        });

        progress.report(1, 4, "step");
        progress.report(4, 4, "done");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (4, 4, "done".to_string()));
    }

    #[test]
    fn test_none_is_never_cancelled() {
        let progress = Progress::none();
        progress.report(0, 1, "ignored");
        assert!(!progress.is_cancelled());
    }
}
