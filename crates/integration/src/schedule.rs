//! Interval-driven recurring jobs, without an async runtime.
//!
//! The timeout mechanism of this system is data-level (`expires_at` plus a
//! periodic sweep), so the scheduler only needs to answer "is this job due
//! and what happened when it ran" — the host decides how often to tick.

use chrono::{DateTime, Duration, Utc};

/// Record of one job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job: String,
    pub ran_at: DateTime<Utc>,
    pub success: bool,
    pub detail: String,
}

/// A named job firing once per interval.
#[derive(Debug, Clone)]
pub struct RecurringJob {
    name: String,
    every: Duration,
    last_run: Option<DateTime<Utc>>,
}

impl RecurringJob {
    pub fn new(name: impl Into<String>, every: Duration) -> Self {
        Self {
            name: name.into(),
            every,
            last_run: None,
        }
    }

    pub fn hourly(name: impl Into<String>) -> Self {
        Self::new(name, Duration::hours(1))
    }

    pub fn daily(name: impl Into<String>) -> Self {
        Self::new(name, Duration::days(1))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    /// Never run, or the interval has elapsed since the last run.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last_run.is_none_or(|last| now - last >= self.every)
    }

    /// Run the job body if due, recording the outcome.
    ///
    /// The body's error is captured into the outcome, never propagated: a
    /// failing job stays scheduled and tries again next interval.
    pub fn run_if_due<F>(&mut self, now: DateTime<Utc>, body: F) -> Option<JobOutcome>
    where
        F: FnOnce() -> anyhow::Result<String>,
    {
        if !self.is_due(now) {
            return None;
        }
        self.last_run = Some(now);

        let outcome = match body() {
            Ok(detail) => JobOutcome {
                job: self.name.clone(),
                ran_at: now,
                success: true,
                detail,
            },
            Err(err) => {
                tracing::error!(job = %self.name, %err, "recurring job failed");
                JobOutcome {
                    job: self.name.clone(),
                    ran_at: now,
                    success: false,
                    detail: err.to_string(),
                }
            }
        };
        Some(outcome)
    }
}
