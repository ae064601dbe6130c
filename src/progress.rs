//! Progress-callback trait for per-product batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the table. The CLI drives its
//! progress bar from these.
//!
//! # Example
//!
//! ```rust
//! use edgequake_specsheet::{BatchProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_product_complete(&self, index: usize, total: usize, name: &str, pages: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} ({} pages)", index, total, name, pages);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each product.
///
/// `on_product_start` fires when classification begins and may be called
/// concurrently for up to `concurrency` products. Completion and error
/// events fire in input order from the rendering loop. All methods default
/// to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after parsing, with the number of products found.
    fn on_batch_start(&self, total_products: usize) {
        let _ = total_products;
    }

    /// Called before a product is sent to the classifier.
    ///
    /// `index` is 1-based.
    fn on_product_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a product has been rendered.
    fn on_product_complete(&self, index: usize, total: usize, name: &str, pages: usize) {
        let _ = (index, total, name, pages);
    }

    /// Called when a product failed; the rest of the batch continues.
    fn on_product_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every product has been attempted.
    fn on_batch_complete(&self, total: usize, done: usize) {
        let _ = (total, done);
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
