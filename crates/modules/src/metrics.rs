//! Metrics for the account modules.

use metrics::{Counter, counter};

/// Signature verification outcomes, labelled by signer scheme.
#[derive(Clone)]
pub struct VerificationMetrics {
    /// Verifications that succeeded
    pub accepted: Counter,

    /// Verifications that returned false or an invalid marker
    pub rejected: Counter,

    /// Verifier backends that errored or panicked
    pub backend_failures: Counter,
}

impl VerificationMetrics {
    pub fn new(scheme: &'static str) -> Self {
        Self {
            accepted: counter!("account_modules_signatures_accepted", "scheme" => scheme),
            rejected: counter!("account_modules_signatures_rejected", "scheme" => scheme),
            backend_failures: counter!("account_modules_verifier_failures", "scheme" => scheme),
        }
    }

    #[inline]
    pub fn record(&self, valid: bool) {
        if valid { self.accepted.increment(1) } else { self.rejected.increment(1) }
    }

    #[inline]
    pub fn record_backend_failure(&self) {
        self.backend_failures.increment(1);
    }
}

impl std::fmt::Debug for VerificationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationMetrics").finish_non_exhaustive()
    }
}

/// Delayed executor metrics
#[derive(Clone)]
pub struct ExecutorMetrics {
    /// Number of operations scheduled
    pub operations_scheduled: Counter,

    /// Number of operations executed
    pub operations_executed: Counter,

    /// Number of operations canceled
    pub operations_canceled: Counter,
}

impl Default for ExecutorMetrics {
    fn default() -> Self {
        Self {
            operations_scheduled: counter!("account_modules_executor_operations_scheduled"),
            operations_executed: counter!("account_modules_executor_operations_executed"),
            operations_canceled: counter!("account_modules_executor_operations_canceled"),
        }
    }
}

impl ExecutorMetrics {
    #[inline]
    pub fn record_scheduled(&self) {
        self.operations_scheduled.increment(1);
    }

    #[inline]
    pub fn record_executed(&self) {
        self.operations_executed.increment(1);
    }

    #[inline]
    pub fn record_canceled(&self) {
        self.operations_canceled.increment(1);
    }
}

impl std::fmt::Debug for ExecutorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorMetrics").finish_non_exhaustive()
    }
}

/// Recovery guardian metrics
#[derive(Clone)]
pub struct RecoveryMetrics {
    /// Number of recoveries started
    pub recoveries_started: Counter,

    /// Number of recoveries executed
    pub recoveries_executed: Counter,

    /// Number of recoveries canceled, by the account or its guardians
    pub recoveries_canceled: Counter,
}

impl Default for RecoveryMetrics {
    fn default() -> Self {
        Self {
            recoveries_started: counter!("account_modules_recoveries_started"),
            recoveries_executed: counter!("account_modules_recoveries_executed"),
            recoveries_canceled: counter!("account_modules_recoveries_canceled"),
        }
    }
}

impl RecoveryMetrics {
    #[inline]
    pub fn record_started(&self) {
        self.recoveries_started.increment(1);
    }

    #[inline]
    pub fn record_executed(&self) {
        self.recoveries_executed.increment(1);
    }

    #[inline]
    pub fn record_canceled(&self) {
        self.recoveries_canceled.increment(1);
    }
}

impl std::fmt::Debug for RecoveryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryMetrics").finish_non_exhaustive()
    }
}
