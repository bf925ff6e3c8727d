//! Counters for the registry and ledger.
//!
//! Lock-free and cheap to share: components hold an `Arc<TrustMetrics>` and bump counters on
//! every accept/reject path.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// A simple counter that can only increase.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct TrustMetrics {
    pub decisions_logged: Counter,
    pub decisions_rejected: Counter,
    pub registrations_accepted: Counter,
    pub registrations_rejected: Counter,
    pub verifications_passed: Counter,
    pub verifications_failed: Counter,
}

/// Point-in-time copy of [`TrustMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub decisions_logged: u64,
    pub decisions_rejected: u64,
    pub registrations_accepted: u64,
    pub registrations_rejected: u64,
    pub verifications_passed: u64,
    pub verifications_failed: u64,
}

impl TrustMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            decisions_logged: self.decisions_logged.get(),
            decisions_rejected: self.decisions_rejected.get(),
            registrations_accepted: self.registrations_accepted.get(),
            registrations_rejected: self.registrations_rejected.get(),
            verifications_passed: self.verifications_passed.get(),
            verifications_failed: self.verifications_failed.get(),
        }
    }
}
