//! Cooperative time budget for a single fit.
//!
//! Both models have unbounded worst-case fit time on pathological inputs, so
//! the fitting loops call [`Deadline::check`] at natural boundaries (each
//! boosting round, around each linear solve). A deadline expires either when
//! its instant passes or when its cancellation flag is raised by a supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ForecastError;

#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    limit: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Deadline {
    /// No time limit.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Expires `limit` from now.
    pub fn after(limit: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + limit),
            limit: Some(limit),
            cancel: None,
        }
    }

    /// Also expire when `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn is_expired(&self) -> bool {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return true;
        }
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// `Err(TimeoutExceeded)` once the deadline has passed.
    pub fn check(&self, stage: &str) -> Result<(), ForecastError> {
        if self.is_expired() {
            return Err(self.timeout_error(stage));
        }
        Ok(())
    }

    pub fn timeout_error(&self, stage: &str) -> ForecastError {
        ForecastError::TimeoutExceeded {
            limit_ms: self.limit.map_or(0, |l| l.as_millis() as u64),
            stage: stage.to_string(),
        }
    }
}
