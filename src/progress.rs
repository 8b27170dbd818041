//! Progress-callback trait for strategy-chain events.
//!
//! Inject an [`Arc<dyn ChainProgressCallback>`] via
//! [`crate::config::EngineConfigBuilder::progress_callback`] to receive
//! events as the chain executor works through its strategies.
//!
//! # Example
//!
//! ```rust
//! use docshift::{ChainProgressCallback, EngineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failed: AtomicUsize,
//! }
//!
//! impl ChainProgressCallback for FailureCounter {
//!     fn on_strategy_failed(&self, strategy_id: &str, diagnostic: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{strategy_id} failed: {diagnostic}");
//!     }
//! }
//!
//! let config = EngineConfig::builder()
//!     .progress_callback(Arc::new(FailureCounter { failed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the chain executor as it tries each strategy.
///
/// Implementations must be `Send + Sync`: independent requests run on
/// different tasks and may share one callback. All methods have default
/// no-op implementations so callers only override what they care about.
pub trait ChainProgressCallback: Send + Sync {
    /// Called once before the first strategy runs.
    ///
    /// # Arguments
    /// * `operation`: human-readable operation, e.g. `"pdf → docx"`
    /// * `strategies`: number of strategies in the chain
    fn on_chain_start(&self, operation: &str, strategies: usize) {
        let _ = (operation, strategies);
    }

    /// Called just before a strategy is invoked.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the chain
    /// * `total`: chain length
    /// * `strategy_id`: e.g. `"soffice:writer"`
    fn on_strategy_start(&self, index: usize, total: usize, strategy_id: &str) {
        let _ = (index, total, strategy_id);
    }

    /// Called when a strategy produced a valid result (the chain stops here).
    fn on_strategy_success(&self, strategy_id: &str, output_bytes: usize) {
        let _ = (strategy_id, output_bytes);
    }

    /// Called when a strategy failed; the chain moves on.
    ///
    /// `diagnostic` is already sanitised (no scratch paths, one line).
    fn on_strategy_failed(&self, strategy_id: &str, diagnostic: &str) {
        let _ = (strategy_id, diagnostic);
    }

    /// Called once after the chain stops, successful or not.
    fn on_chain_complete(&self, success: bool, attempts: usize) {
        let _ = (success, attempts);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ChainProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::EngineConfig`].
pub type ProgressCallback = Arc<dyn ChainProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        started: AtomicUsize,
        failed: AtomicUsize,
        succeeded: Mutex<Vec<String>>,
        chain_len: AtomicUsize,
    }

    impl ChainProgressCallback for TrackingCallback {
        fn on_chain_start(&self, _operation: &str, strategies: usize) {
            self.chain_len.store(strategies, Ordering::SeqCst);
        }

        fn on_strategy_start(&self, _index: usize, _total: usize, _strategy_id: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_strategy_success(&self, strategy_id: &str, _output_bytes: usize) {
            self.succeeded.lock().unwrap().push(strategy_id.to_string());
        }

        fn on_strategy_failed(&self, _strategy_id: &str, _diagnostic: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_chain_start("pdf → docx", 4);
        cb.on_strategy_start(1, 4, "remote");
        cb.on_strategy_failed("remote", "timed out");
        cb.on_strategy_success("pdf2docx", 2048);
        cb.on_chain_complete(true, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_chain_start("compress", 3);
        tracker.on_strategy_start(1, 3, "gs:screen");
        tracker.on_strategy_failed("gs:screen", "exit 1");
        tracker.on_strategy_start(2, 3, "qpdf:recompress");
        tracker.on_strategy_success("qpdf:recompress", 900);

        assert_eq!(tracker.chain_len.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.started.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failed.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.succeeded.lock().unwrap(), vec!["qpdf:recompress"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_chain_start("protect", 3);
    }
}
