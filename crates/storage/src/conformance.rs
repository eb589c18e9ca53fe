//! Conformance test suite for `StateStore` implementations.
//!
//! Backend-agnostic checks any store can run:
//!
//! - **Absence**: an unknown key loads as `None`
//! - **Round trip**: a saved record loads back unchanged
//! - **Overwrite**: a second save replaces the first
//! - **Clear**: a cleared key loads as `None`; clearing twice succeeds
//! - **Isolation**: keys do not affect each other
//!
//! # Usage
//!
//! ```ignore
//! use formwork_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn my_store_conformance() {
//!     let report = run_conformance_suite(|| async { MyStore::connect().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use crate::record::StepSnapshotRecord;
use crate::StateStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => TestResult {
                name: name.to_string(),
                passed: true,
                message: None,
            },
            Err(msg) => TestResult {
                name: name.to_string(),
                passed: false,
                message: Some(msg),
            },
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}]: {}",
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store.
///
/// `factory` is called once per test and must return a fresh, empty store.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let results = vec![
        TestResult::from_result("missing_key_loads_none", missing_key_loads_none(&factory).await),
        TestResult::from_result("save_then_load_round_trips", save_then_load(&factory).await),
        TestResult::from_result("second_save_overwrites", second_save_overwrites(&factory).await),
        TestResult::from_result("clear_removes_record", clear_removes(&factory).await),
        TestResult::from_result("clear_missing_key_succeeds", clear_missing(&factory).await),
        TestResult::from_result("keys_are_isolated", keys_are_isolated(&factory).await),
    ];

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();
    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

fn sample_record(current_step: usize) -> StepSnapshotRecord {
    let mut step_data = BTreeMap::new();
    step_data.insert(
        "personal".to_string(),
        [
            ("firstName".to_string(), serde_json::json!("Ada")),
            ("age".to_string(), serde_json::json!(36)),
        ]
        .into_iter()
        .collect(),
    );
    StepSnapshotRecord {
        current_step,
        step_data,
        completed_steps: (0..current_step).collect(),
        saved_at: Some("2025-01-01T00:00:00Z".to_string()),
    }
}

async fn missing_key_loads_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.load("never-saved").await {
        Ok(None) => Ok(()),
        Ok(Some(r)) => Err(format!("expected None, got {:?}", r)),
        Err(e) => Err(format!("expected None, got error: {}", e)),
    }
}

async fn save_then_load<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let record = sample_record(1);
    store.save("flow", &record).await.map_err(|e| e.to_string())?;
    let loaded = store.load("flow").await.map_err(|e| e.to_string())?;
    if loaded.as_ref() != Some(&record) {
        return Err(format!("round trip mismatch: {:?}", loaded));
    }
    Ok(())
}

async fn second_save_overwrites<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .save("flow", &sample_record(1))
        .await
        .map_err(|e| e.to_string())?;
    store
        .save("flow", &sample_record(2))
        .await
        .map_err(|e| e.to_string())?;
    match store.load("flow").await.map_err(|e| e.to_string())? {
        Some(r) if r.current_step == 2 => Ok(()),
        other => Err(format!("expected currentStep 2, got {:?}", other)),
    }
}

async fn clear_removes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .save("flow", &sample_record(1))
        .await
        .map_err(|e| e.to_string())?;
    store.clear("flow").await.map_err(|e| e.to_string())?;
    match store.load("flow").await.map_err(|e| e.to_string())? {
        None => Ok(()),
        Some(r) => Err(format!("record survived clear: {:?}", r)),
    }
}

async fn clear_missing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store.clear("flow").await.map_err(|e| e.to_string())?;
    store.clear("flow").await.map_err(|e| e.to_string())
}

async fn keys_are_isolated<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .save("flow-a", &sample_record(1))
        .await
        .map_err(|e| e.to_string())?;
    store
        .save("flow-b", &sample_record(2))
        .await
        .map_err(|e| e.to_string())?;
    store.clear("flow-a").await.map_err(|e| e.to_string())?;
    match store.load("flow-b").await.map_err(|e| e.to_string())? {
        Some(r) if r.current_step == 2 => Ok(()),
        other => Err(format!("clearing flow-a affected flow-b: {:?}", other)),
    }
}
