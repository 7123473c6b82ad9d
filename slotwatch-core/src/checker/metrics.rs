use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerMetrics {
    pub runs_started: u64,
    pub runs_skipped: u64,
    pub runs_failed: u64,
    pub availability_found: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub reloads: u64,
}

impl CheckerMetrics {
    pub fn record_run_started(&mut self) {
        self.runs_started = self.runs_started.saturating_add(1);
    }

    pub fn record_run_skipped(&mut self) {
        self.runs_skipped = self.runs_skipped.saturating_add(1);
    }

    pub fn record_run_failed(&mut self) {
        self.runs_failed = self.runs_failed.saturating_add(1);
    }

    pub fn record_availability(&mut self) {
        self.availability_found = self.availability_found.saturating_add(1);
    }

    pub fn record_notification(&mut self, delivered: bool) {
        if delivered {
            self.notifications_sent = self.notifications_sent.saturating_add(1);
        } else {
            self.notification_failures = self.notification_failures.saturating_add(1);
        }
    }

    pub fn record_reload(&mut self) {
        self.reloads = self.reloads.saturating_add(1);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsHandle(Arc<Mutex<CheckerMetrics>>);

impl MetricsHandle {
    pub fn record<F>(&self, f: F)
    where
        F: FnOnce(&mut CheckerMetrics),
    {
        if let Ok(mut guard) = self.0.lock() {
            f(&mut guard);
        }
    }

    pub fn snapshot(&self) -> CheckerMetrics {
        self.0
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_shares_counters() {
        let handle = MetricsHandle::default();
        let clone = handle.clone();
        clone.record(|m| m.record_reload());
        handle.record(|m| m.record_notification(false));
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.reloads, 1);
        assert_eq!(snapshot.notification_failures, 1);
        assert_eq!(snapshot.notifications_sent, 0);
    }
}
