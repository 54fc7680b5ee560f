//! Cron scheduling
//!
//! Parses cron expressions (5-field minute resolution or 6/7-field with
//! seconds) and runs a job at each fire time until cancelled.

use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from cron parsing
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expr}': {reason}")]
    Invalid { expr: String, reason: String },
}

/// A validated cron expression
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parse a cron expression
    ///
    /// Five fields (`m h dom mon dow`) are read as firing at second 0.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        let fields = trimmed.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {}", trimmed),
            6 | 7 => trimmed.to_string(),
            _ => {
                return Err(ScheduleError::Invalid {
                    expr: expr.to_string(),
                    reason: format!("expected 5 to 7 fields, found {}", fields),
                })
            }
        };

        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| ScheduleError::Invalid {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expr: trimmed.to_string(),
            schedule,
        })
    }

    /// The expression as the user wrote it
    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `after`
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }

    /// Next `count` fire times from now
    pub fn upcoming(&self, count: usize) -> Vec<DateTime<Local>> {
        self.schedule.upcoming(Local).take(count).collect()
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}

/// Runs a job on a cron schedule
pub struct Scheduler {
    schedule: CronSchedule,
}

impl Scheduler {
    pub fn new(schedule: CronSchedule) -> Self {
        Self { schedule }
    }

    /// Run `job` at every fire time until `cancel` fires
    ///
    /// Runs are sequential. A fire time that passes while a run is still
    /// going is skipped. Returns the number of completed runs.
    pub async fn run<F, Fut>(&self, cancel: CancellationToken, mut job: F) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut runs = 0;
        tracing::info!(cron = %self.schedule, "scheduler started");

        loop {
            let now = Local::now();
            let Some(next) = self.schedule.next_after(&now) else {
                tracing::info!(cron = %self.schedule, "schedule has no further fire times");
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next = %next, wait_secs = wait.as_secs_f64(), "waiting for next run");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            tracing::info!(cron = %self.schedule, "running scheduled job");
            // A job that finishes and cancels in the same poll still counts
            tokio::select! {
                biased;
                _ = job() => runs += 1,
                _ = cancel.cancelled() => break,
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        tracing::info!(runs, "scheduler stopped");
        runs
    }
}
