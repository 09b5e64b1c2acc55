use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const EVERY_PREFIX: &str = "@every";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleParseError {
    #[error("Empty schedule")]
    Empty,

    #[error("Invalid cron expression {expr:?}: {reason}")]
    Cron { expr: String, reason: String },

    #[error("Invalid interval {expr:?}, expected e.g. \"@every 30s\" or \"@every 1h30m\": {reason}")]
    Interval { expr: String, reason: String },
}

/// A parsed job schedule.
#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Cron expression with a seconds field (a 5-field expression gets
    /// second 0 prepended).
    Cron {
        expr: String,
        schedule: Box<cron::Schedule>,
    },
    /// Run at fixed intervals.
    Interval(Duration),
}

impl JobSchedule {
    pub fn parse(raw: &str) -> Result<Self, ScheduleParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ScheduleParseError::Empty);
        }

        if let Some(rest) = raw.strip_prefix(EVERY_PREFIX) {
            let interval = humantime::parse_duration(rest.trim()).map_err(|e| {
                ScheduleParseError::Interval {
                    expr: raw.to_string(),
                    reason: e.to_string(),
                }
            })?;
            if interval.is_zero() {
                return Err(ScheduleParseError::Interval {
                    expr: raw.to_string(),
                    reason: "interval must be positive".to_string(),
                });
            }
            return Ok(JobSchedule::Interval(interval));
        }

        let normalized = if !raw.starts_with('@') && raw.split_whitespace().count() == 5 {
            format!("0 {}", raw)
        } else {
            raw.to_string()
        };
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| ScheduleParseError::Cron {
                expr: raw.to_string(),
                reason: e.to_string(),
            })?;
        Ok(JobSchedule::Cron {
            expr: raw.to_string(),
            schedule: Box::new(schedule),
        })
    }

    /// First firing time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            JobSchedule::Cron { schedule, .. } => schedule.after(&after).next(),
            JobSchedule::Interval(interval) => {
                Some(after + chrono::Duration::from_std(*interval).ok()?)
            }
        }
    }
}

impl FromStr for JobSchedule {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobSchedule::parse(s)
    }
}

impl fmt::Display for JobSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSchedule::Cron { expr, .. } => f.write_str(expr),
            JobSchedule::Interval(interval) => {
                write!(f, "{} {}", EVERY_PREFIX, humantime::format_duration(*interval))
            }
        }
    }
}
