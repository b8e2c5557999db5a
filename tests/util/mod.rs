//! Shared helpers for integration tests.

use dashboard_state::dashboard::{DashboardStore, MetricsViewSchema};
use dashboard_state::time::ObservedRange;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sales view used across the suites.
#[allow(dead_code)]
pub fn sales_schema() -> MetricsViewSchema {
    MetricsViewSchema::from_names(
        ["revenue", "orders", "avg_basket"],
        ["country", "device", "channel"],
    )
}

/// Fourteen days of data.
#[allow(dead_code)]
pub fn two_weeks() -> ObservedRange {
    ObservedRange::parse("2024-01-01T00:00:00Z", "2024-01-15T00:00:00Z").unwrap()
}

/// A store with the `sales` view initialised over [`two_weeks`].
#[allow(dead_code)]
pub fn sales_store() -> DashboardStore {
    let store = DashboardStore::default();
    store
        .init("sales", &sales_schema(), Some(&two_weeks()))
        .unwrap();
    store
}

#[allow(dead_code)]
pub fn schema_json() -> String {
    serde_json::to_string(&sales_schema()).unwrap()
}
