//! Schedule Expression Engine
//!
//! Wraps the `cron` crate (6 fields `sec min hour dom mon dow`, optional 7th
//! year field, evaluated in UTC) and adds `@every <n><unit>` aliases plus the
//! staggered period schedules used by timer-load cache containers.

use super::error::{DomainError, Result};
use super::hash::stable_hash;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Divisors of 60, ascending
const DIVISORS_OF_60: [u64; 12] = [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60];

/// Divisors of 24, ascending
const DIVISORS_OF_24: [u64; 8] = [1, 2, 3, 4, 6, 8, 12, 24];

/// Parsed schedule expression
#[derive(Clone)]
pub struct ScheduleExpr {
    source: String,
    schedule: cron::Schedule,
}

impl ScheduleExpr {
    /// Parse a cron expression or an `@every` alias
    ///
    /// # Example
    /// ```text
    /// let every_5m = ScheduleExpr::parse("0 */5 * * * *")?;
    /// let every_1s = ScheduleExpr::parse("@every 1s")?;
    /// ```
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(invalid(expr, "expression is empty"));
        }

        let cron_expr = match trimmed.strip_prefix("@every") {
            Some(rest) => every_to_cron(expr, rest.trim())?,
            None => trimmed.to_string(),
        };

        let schedule = cron::Schedule::from_str(&cron_expr)
            .map_err(|e| invalid(expr, &e.to_string()))?;

        // A syntactically valid expression that never fires (e.g. Feb 30th) is
        // as useless as a broken one.
        if schedule.upcoming(Utc).next().is_none() {
            return Err(invalid(expr, "expression never fires"));
        }

        Ok(Self {
            source: trimmed.to_string(),
            schedule,
        })
    }

    /// Schedule firing every `period_ms`, staggered by a deterministic
    /// per-identity second/minute/hour offset.
    ///
    /// Periods that do not divide their unit are rounded down to the nearest
    /// divisor so the refresh never happens less often than configured.
    pub fn period_schedule(period_ms: i64, identity: &str) -> Result<Self> {
        if period_ms < 1000 {
            return Err(DomainError::InvalidCachePolicy(format!(
                "timer-load period must be at least 1000ms, got {}ms",
                period_ms
            )));
        }

        let secs = (period_ms / 1000) as u64;
        let h = stable_hash(identity);
        let sec_offset = h % 60;
        let min_offset = (h / 60) % 60;

        let expr = if secs < 60 {
            let step = floor_divisor(&DIVISORS_OF_60, secs);
            stepped(h % step, step) + " * * * * *"
        } else if secs < 3600 {
            let step = floor_divisor(&DIVISORS_OF_60, secs / 60);
            format!("{} {} * * * *", sec_offset, stepped((h / 60) % step, step))
        } else if secs < 86_400 {
            let step = floor_divisor(&DIVISORS_OF_24, secs / 3600);
            format!(
                "{} {} {} * * *",
                sec_offset,
                min_offset,
                stepped((h / 3600) % step, step)
            )
        } else {
            format!("{} {} {} * * *", sec_offset, min_offset, (h / 3600) % 24)
        };

        Self::parse(&expr)
    }

    /// Original expression text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First fire instant strictly after `after_ms` (epoch milliseconds)
    pub fn next_after(&self, after_ms: i64) -> Option<i64> {
        let after = DateTime::<Utc>::from_timestamp_millis(after_ms)?;
        self.schedule
            .after(&after)
            .next()
            .map(|next| next.timestamp_millis())
    }
}

impl fmt::Debug for ScheduleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScheduleExpr").field(&self.source).finish()
    }
}

impl fmt::Display for ScheduleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for ScheduleExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ScheduleExpr {}

impl FromStr for ScheduleExpr {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(expr: &str, reason: &str) -> DomainError {
    DomainError::InvalidSchedule {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
}

/// `@every 30s` / `@every 5m` / `@every 2h` → cron
fn every_to_cron(expr: &str, spec: &str) -> Result<String> {
    let split = spec
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| invalid(expr, "missing unit (s, m or h)"))?;
    let (amount, unit) = spec.split_at(split);
    let n: u64 = amount
        .parse()
        .map_err(|_| invalid(expr, "missing or invalid amount"))?;
    if n == 0 {
        return Err(invalid(expr, "period must be positive"));
    }

    let (n, unit) = match unit {
        "s" if n % 3600 == 0 => (n / 3600, "h"),
        "s" if n % 60 == 0 => (n / 60, "m"),
        "m" if n % 60 == 0 => (n / 60, "h"),
        other => (n, other),
    };

    match unit {
        "s" if 60 % n == 0 => Ok(stepped(0, n) + " * * * * *"),
        "m" if 60 % n == 0 => Ok(format!("0 {} * * * *", stepped(0, n))),
        "h" if n == 24 => Ok("0 0 0 * * *".to_string()),
        "h" if 24 % n == 0 => Ok(format!("0 0 {} * * *", stepped(0, n))),
        "s" | "m" | "h" => Err(invalid(
            expr,
            "period must evenly divide its enclosing unit",
        )),
        _ => Err(invalid(expr, "unit must be one of s, m, h")),
    }
}

/// Cron field for "every `step` starting at `offset`"
fn stepped(offset: u64, step: u64) -> String {
    match (offset, step) {
        (_, 1) => "*".to_string(),
        (0, step) => format!("*/{}", step),
        (offset, step) => format!("{}/{}", offset, step),
    }
}

fn floor_divisor(divisors: &[u64], value: u64) -> u64 {
    divisors
        .iter()
        .copied()
        .take_while(|d| *d <= value.max(1))
        .last()
        .unwrap_or(1)
}
