use std::collections::BTreeMap;

use parking_lot::Mutex;

use tally_api::MetricsSink;

/// Name of the per-customer purchase counter.
pub fn purchase_counter(customer: &str) -> String {
    format!("purchases.{customer}")
}

/// In-process counters, readable via `snapshot()`.
#[derive(Debug, Default)]
pub struct CounterSink {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl CounterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: &str) -> u64 {
        self.counters.lock().get(counter).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.lock().clone()
    }
}

impl MetricsSink for CounterSink {
    fn increment(&self, counter: &str) {
        let mut counters = self.counters.lock();
        match counters.get_mut(counter) {
            Some(value) => *value += 1,
            None => {
                counters.insert(counter.to_string(), 1);
            }
        }
    }
}

/// Reports every increment as a `debug` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn increment(&self, counter: &str) {
        tracing::debug!(counter, by = 1, "metric increment");
    }
}
