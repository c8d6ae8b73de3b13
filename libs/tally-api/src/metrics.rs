/// Counter sink the pipeline reports to after each stored purchase.
///
/// Fire-and-forget: implementations swallow their own failures and must not
/// block ingestion.
pub trait MetricsSink: Send + Sync {
    /// Increment the counter named `counter` by one.
    fn increment(&self, counter: &str);
}

/// Sink that drops every increment.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _counter: &str) {}
}

impl<T: MetricsSink + ?Sized> MetricsSink for std::sync::Arc<T> {
    fn increment(&self, counter: &str) {
        (**self).increment(counter);
    }
}

/// Fan-out: every increment goes to both sinks.
impl<A: MetricsSink, B: MetricsSink> MetricsSink for (A, B) {
    fn increment(&self, counter: &str) {
        self.0.increment(counter);
        self.1.increment(counter);
    }
}
