//! Integration tests for the batch pipeline.
//!
//! Every test plugs a deterministic [`ClassifierBackend`] into the config, so
//! nothing here touches the network. Output directories are temp dirs.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_specsheet::{
    convert_to_dir, run_batch, BackendError, BatchProgressCallback, ClassificationRequest,
    ClassifierBackend, OutputMode, PipelineConfig, ProductError, ProductState, Stage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Files every row under a category picked from its label, citing sources.
struct KeywordBackend {
    /// Products whose name is listed here always fail with a transient error.
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl KeywordBackend {
    fn new() -> Arc<Self> {
        Self::failing(&[])
    }

    fn failing(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: names.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ClassifierBackend for KeywordBackend {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&request.name) {
            return Err(BackendError::Transient("503 Service Unavailable".into()));
        }
        let categories: Vec<serde_json::Value> = request
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let category = match entry.label.as_str() {
                    "CPU" => "Processor",
                    "RAM" => "memory",
                    "SSD" => "Storage",
                    _ => "Notes",
                };
                serde_json::json!({
                    "name": category,
                    "items": [{"label": entry.label, "value": entry.value, "source": i + 1}]
                })
            })
            .collect();
        Ok(serde_json::json!({ "categories": categories }).to_string())
    }
}

/// Delegates to [`KeywordBackend`] after a pause, so calls overlap.
struct SlowBackend {
    inner: Arc<KeywordBackend>,
}

#[async_trait]
impl ClassifierBackend for SlowBackend {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, BackendError> {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.inner.classify(request).await
    }
}

/// Always answers with prose.
struct ChattyBackend;

#[async_trait]
impl ClassifierBackend for ChattyBackend {
    async fn classify(&self, _request: &ClassificationRequest) -> Result<String, BackendError> {
        Ok("Happy to help! This laptop has a great processor.".into())
    }
}

fn catalogue(products: usize) -> String {
    let mut md = String::from(
        "# Catalogue\n\n| Product | Configurations | Price |\n|---------|----------------|-------|\n",
    );
    for i in 1..=products {
        md.push_str(&format!("| Product {i} | Base | ${i}00.00 |\n"));
        md.push_str("| NaN | CPU | Intel Core i5-1335U |\n");
        md.push_str("| NaN | RAM | 16GB DDR5 |\n");
        md.push_str("| NaN | SSD | 512GB NVMe |\n");
    }
    md
}

fn config(backend: Arc<dyn ClassifierBackend>) -> PipelineConfig {
    PipelineConfig::builder()
        .backend(backend)
        .max_attempts(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

/// Route pipeline logs to the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w == needle.as_bytes())
}

// ── Batch behaviour ──────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_product_is_isolated() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("products.md");
    std::fs::write(&input, catalogue(5)).unwrap();
    let out_dir = dir.path().join("out");

    let backend = KeywordBackend::failing(&["Product 3"]);
    let output = convert_to_dir(&input, &out_dir, &config(backend.clone()))
        .await
        .unwrap();

    assert_eq!(output.summary.products, 5);
    assert_eq!(output.summary.done, 4);
    assert_eq!(output.summary.failed, 1);

    let failed: Vec<_> = output.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "Product 3");
    assert!(matches!(
        failed[0].state,
        ProductState::Failed {
            stage: Stage::Classify,
            ..
        }
    ));
    assert!(matches!(
        failed[0].error,
        Some(ProductError::ClassificationFailed { attempts: 2, .. })
    ));

    let mut files: Vec<String> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec![
            "Product 1_spec.pdf",
            "Product 2_spec.pdf",
            "Product 4_spec.pdf",
            "Product 5_spec.pdf",
        ]
    );

    // Two attempts for the failing product, one for each of the others.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn reports_keep_input_order_under_concurrency() {
    let cfg = PipelineConfig::builder()
        .backend(KeywordBackend::new())
        .concurrency(3)
        .build()
        .unwrap();
    let output = run_batch(&catalogue(7), &cfg).await.unwrap();
    let names: Vec<_> = output.reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        (1..=7).map(|i| format!("Product {i}")).collect::<Vec<_>>()
    );
    assert!(output.reports.iter().all(|r| r.state == ProductState::Done));
}

#[tokio::test]
async fn duplicate_products_share_one_classification() {
    let mut md = catalogue(1);
    md.push_str("| Product 1 | Base | $100.00 |\n");
    md.push_str("| NaN | CPU | Intel Core i5-1335U |\n");
    md.push_str("| NaN | RAM | 16GB DDR5 |\n");
    md.push_str("| NaN | SSD | 512GB NVMe |\n");

    let keyword = KeywordBackend::new();
    let cfg = PipelineConfig::builder()
        .backend(Arc::new(SlowBackend {
            inner: keyword.clone(),
        }))
        .concurrency(4)
        .build()
        .unwrap();
    let output = run_batch(&md, &cfg).await.unwrap();

    assert_eq!(keyword.calls.load(Ordering::SeqCst), 1);
    assert_eq!(output.summary.done, 2);
    let names: Vec<_> = output.documents.iter().map(|d| d.file_name.as_str()).collect();
    assert_eq!(names, ["Product 1_spec.pdf", "Product 1_spec_2.pdf"]);
}

#[tokio::test]
async fn dell_scenario_renders_one_page() {
    let md = "| Product | Configurations | Price |\n|---|---|---|\n\
              | Dell Latitude | Base | $999.00 |\n\
              | NaN | CPU | i7-1355U |\n\
              | NaN | RAM | 16GB |\n";
    let output = run_batch(md, &config(KeywordBackend::new())).await.unwrap();

    assert_eq!(output.documents.len(), 1);
    let pdf = &output.documents[0];
    assert_eq!(pdf.file_name, "Dell Latitude_spec.pdf");
    assert_eq!(pdf.pages, 1);
    assert!(contains(&pdf.bytes, "(Dell Latitude)"));
    assert!(contains(&pdf.bytes, "($999.00)"));
    assert!(contains(&pdf.bytes, "(Processor)"));
    assert!(contains(&pdf.bytes, "(Memory)"));

    let report = &output.reports[0];
    assert_eq!(report.items, 2);
    assert_eq!(report.categories, 2);
}

#[tokio::test]
async fn unparsable_answers_degrade_but_still_render() {
    let output = run_batch(&catalogue(2), &config(Arc::new(ChattyBackend)))
        .await
        .unwrap();
    assert_eq!(output.summary.done, 2);
    assert_eq!(output.summary.degraded, 2);
    for report in &output.reports {
        assert!(report.degraded);
        assert_eq!(report.items, 3);
    }
    assert!(contains(&output.documents[0].bytes, "(Unclassified)"));
}

#[tokio::test]
async fn oversize_row_fails_only_its_product() {
    init_tracing();
    let mut md = catalogue(2);
    md.push_str("| Product 3 | Base | $300.00 |\n");
    md.push_str(&format!("| NaN | Notes | {} |\n", "lorem ipsum ".repeat(3000)));

    let output = run_batch(&md, &config(KeywordBackend::new())).await.unwrap();
    assert_eq!(output.summary.done, 2);
    assert_eq!(output.summary.failed, 1);
    let failed = output.failed().next().unwrap();
    assert_eq!(failed.name, "Product 3");
    assert!(matches!(
        failed.state,
        ProductState::Failed {
            stage: Stage::Render,
            ..
        }
    ));
    assert_eq!(output.documents.len(), 2);
}

#[tokio::test]
async fn combined_mode_writes_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("products.md");
    std::fs::write(&input, catalogue(3)).unwrap();

    let cfg = PipelineConfig::builder()
        .backend(KeywordBackend::failing(&["Product 2"]))
        .max_attempts(1)
        .output_mode(OutputMode::combined())
        .build()
        .unwrap();
    let output = convert_to_dir(&input, dir.path(), &cfg).await.unwrap();

    assert_eq!(output.documents.len(), 1);
    let pdf = &output.documents[0];
    assert_eq!(pdf.file_name, "spec_sheets.pdf");
    assert_eq!(pdf.products, vec!["Product 1", "Product 3"]);
    assert_eq!(pdf.pages, 2);

    let bytes = std::fs::read(dir.path().join("spec_sheets.pdf")).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    assert!(contains(&bytes, "/Count 2"));
    assert!(contains(&bytes, "(Spec sheets)"));
    assert!(!contains(&bytes, "(Product 2)"));
}

#[tokio::test]
async fn parse_warnings_are_reported_not_fatal() {
    let md = "| Product | Configurations | Price |\n|---|---|---|\n\
              | NaN | CPU | orphan |\n\
              | Solo |\n\
              | HP EliteBook | Base | $1,299.00 |\n\
              | NaN | RAM | 32GB |\n";
    let output = run_batch(md, &config(KeywordBackend::new())).await.unwrap();
    assert_eq!(output.summary.warnings, 2);
    assert_eq!(output.summary.done, 1);
    assert_eq!(output.reports[0].name, "HP EliteBook");
}

#[derive(Default)]
struct EventLog {
    started: AtomicUsize,
    completed: AtomicUsize,
    errors: Mutex<Vec<String>>,
    batch: Mutex<Option<(usize, usize)>>,
}

impl BatchProgressCallback for EventLog {
    fn on_product_start(&self, _index: usize, _total: usize, _name: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_product_complete(&self, _index: usize, _total: usize, _name: &str, _pages: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_product_error(&self, _index: usize, _total: usize, name: &str, _error: &str) {
        self.errors.lock().unwrap().push(name.to_string());
    }

    fn on_batch_complete(&self, total: usize, done: usize) {
        *self.batch.lock().unwrap() = Some((total, done));
    }
}

#[tokio::test]
async fn progress_callback_sees_every_product() {
    let log = Arc::new(EventLog::default());
    let cfg = PipelineConfig::builder()
        .backend(KeywordBackend::failing(&["Product 4"]))
        .max_attempts(1)
        .progress_callback(log.clone())
        .build()
        .unwrap();
    run_batch(&catalogue(4), &cfg).await.unwrap();

    assert_eq!(log.started.load(Ordering::SeqCst), 4);
    assert_eq!(log.completed.load(Ordering::SeqCst), 3);
    assert_eq!(*log.errors.lock().unwrap(), vec!["Product 4".to_string()]);
    assert_eq!(*log.batch.lock().unwrap(), Some((4, 3)));
}
