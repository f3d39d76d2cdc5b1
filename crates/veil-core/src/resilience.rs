//! Failure Classification and Retry Policy
//!
//! Turns transport failures into an [`ErrorClass`] and advises whether a
//! failed connect should be retried, and after how long.
//!
//! # Backoff
//!
//! The delay before retry `n` is `min(2^n, 30)` seconds:
//!
//! | Attempt | 1 | 2 | 3 | 4 | 5 | 6 | 7 |
//! |---------|---|---|---|---|---|---|---|
//! | Delay (s) | 2 | 4 | 8 | 16 | 30 | 30 | 30 |
//!
//! The controller only advises. It never sleeps or reconnects on its own;
//! the caller waits out the delay and connects again.

use crate::transport::{AlwaysReachable, ConnectivityProbe, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Default maximum number of connect attempts per failure episode
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default backoff cap (seconds)
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NoConnectivity,
    Timeout,
    ServerError(u16),
    SecurityViolation,
    CertificateInvalid,
    Unknown,
}

impl ErrorClass {
    /// Can a later attempt plausibly succeed?
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorClass::SecurityViolation | ErrorClass::CertificateInvalid)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::NoConnectivity => write!(f, "No connectivity"),
            ErrorClass::Timeout => write!(f, "Timed out"),
            ErrorClass::ServerError(code) => write!(f, "Server error ({})", code),
            ErrorClass::SecurityViolation => write!(f, "Security violation"),
            ErrorClass::CertificateInvalid => write!(f, "Invalid certificate"),
            ErrorClass::Unknown => write!(f, "Unknown error"),
        }
    }
}

/// Retry limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per failure episode, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff cap (seconds)
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_max_delay_secs() -> u64 {
    DEFAULT_MAX_DELAY_SECS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
        }
    }
}

/// One failed attempt inside a failure episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// Starts at 1
    pub attempt_number: u32,
    /// Why it failed
    pub error_class: ErrorClass,
    /// Wait before the next attempt (seconds)
    pub next_delay_secs: u64,
}

impl RetryAttempt {
    /// Delay as a `Duration`
    pub fn next_delay(&self) -> Duration {
        Duration::from_secs(self.next_delay_secs)
    }
}

/// Advice after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `next_delay` and connect again
    Retry(RetryAttempt),
    /// Stop; surface the error
    GiveUp { attempts: u32, class: ErrorClass },
}

impl RetryDecision {
    /// Should the caller retry?
    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry(_))
    }
}

/// Failure classifier and retry advisor.
///
/// Stateless between failure episodes apart from the attempt in progress.
pub struct ResilienceController {
    /// Limits
    policy: RetryPolicy,
    /// Consulted before retrying timeouts
    probe: Arc<dyn ConnectivityProbe>,
    /// Most recent failed attempt of the current episode
    current: Mutex<Option<RetryAttempt>>,
}

impl ResilienceController {
    /// Create a controller
    pub fn new(policy: RetryPolicy, probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            policy,
            probe,
            current: Mutex::new(None),
        }
    }

    /// Default policy, network assumed reachable
    pub fn with_defaults() -> Self {
        Self::new(RetryPolicy::default(), Arc::new(AlwaysReachable))
    }

    /// Get the policy
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Classify a transport failure
    pub fn classify(&self, error: &TransportError) -> ErrorClass {
        match error {
            TransportError::NoConnectivity(_) => ErrorClass::NoConnectivity,
            TransportError::Timeout => ErrorClass::Timeout,
            TransportError::Server { code } => ErrorClass::ServerError(*code),
            TransportError::SecurityViolation(_) => ErrorClass::SecurityViolation,
            TransportError::CertificateInvalid(_) => ErrorClass::CertificateInvalid,
            TransportError::Other(_) => ErrorClass::Unknown,
        }
    }

    /// Backoff before attempt `attempt_number + 1`: `min(2^n, cap)` seconds
    pub fn next_delay(&self, attempt_number: u32) -> Duration {
        Duration::from_secs(backoff_secs(attempt_number, self.policy.max_delay_secs))
    }

    /// Should a failure of `class` on attempt `attempt_number` be retried?
    pub fn should_retry(&self, class: ErrorClass, attempt_number: u32, max_attempts: u32) -> bool {
        if !class.is_recoverable() || attempt_number >= max_attempts {
            return false;
        }

        match class {
            ErrorClass::Timeout => self.probe.is_reachable(),
            ErrorClass::NoConnectivity | ErrorClass::ServerError(_) => true,
            _ => false,
        }
    }

    /// Record a failure in the current episode and advise the caller
    pub fn record_failure(&self, class: ErrorClass) -> RetryDecision {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let attempt_number = current.map_or(1, |a| a.attempt_number.saturating_add(1));

        if !self.should_retry(class, attempt_number, self.policy.max_attempts) {
            warn!("Giving up after attempt {}: {}", attempt_number, class);
            *current = None;
            return RetryDecision::GiveUp {
                attempts: attempt_number,
                class,
            };
        }

        let attempt = RetryAttempt {
            attempt_number,
            error_class: class,
            next_delay_secs: backoff_secs(attempt_number, self.policy.max_delay_secs),
        };
        debug!(
            "Attempt {} failed ({}), retry in {}s",
            attempt_number, class, attempt.next_delay_secs
        );

        *current = Some(attempt);
        RetryDecision::Retry(attempt)
    }

    /// End the current episode (connectivity restored)
    pub fn reset(&self) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Most recent failed attempt of the current episode
    pub fn current_attempt(&self) -> Option<RetryAttempt> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ResilienceController {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn backoff_secs(attempt_number: u32, cap: u64) -> u64 {
    1u64.checked_shl(attempt_number).unwrap_or(u64::MAX).min(cap)
}
