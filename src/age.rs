// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Age cutoffs and the gcroot eligibility filter
//!
//! A cutoff is an absolute instant. Roots registered strictly before it are
//! eligible for removal. Cutoffs come either from "now" or from a human
//! readable expression such as `7 days ago`, `2w` or `2024-01-31`.

use crate::error::AgeParseError;
use crate::gcroot::{GcRoot, Registration};
use chrono::{
    DateTime, Duration, Local, LocalResult, Months, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// What to do with roots that have no registration record
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum UnknownAgePolicy {
    /// Report them and leave them alone
    #[default]
    Exclude,
    /// Treat them as infinitely old
    Include,
}

/// Instant separating eligible roots from retained ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Cutoff(DateTime<Utc>);

impl Cutoff {
    /// The current instant
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// A fixed instant
    #[must_use]
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    /// Cutoff for an optional command-line expression.
    ///
    /// `None` and blank strings mean "now". Local dates are read in the
    /// system time zone.
    ///
    /// # Errors
    ///
    /// Any expression that does not parse.
    pub fn from_expression(expr: Option<&str>) -> Result<Self, AgeParseError> {
        match expr.map(str::trim).filter(|e| !e.is_empty()) {
            None => Ok(Self::now()),
            Some(e) => Self::parse_relative_to(e, Local::now()),
        }
    }

    /// Parse `expr` with `now` as the reference instant.
    ///
    /// Dates without an offset are interpreted in `now`'s time zone.
    ///
    /// # Errors
    ///
    /// [`AgeParseError`] describing why the expression was rejected.
    pub fn parse_relative_to<Tz: TimeZone>(
        expr: &str,
        now: DateTime<Tz>,
    ) -> Result<Self, AgeParseError> {
        parse_cutoff(expr, &now).map(Self)
    }

    /// The instant
    #[must_use]
    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Decides which roots may be removed
#[derive(Debug, Clone, Copy)]
pub struct AgeFilter {
    cutoff: Cutoff,
    unknown: UnknownAgePolicy,
}

/// Roots split by the filter
#[derive(Debug, Default)]
pub struct Selection {
    /// Registered before the cutoff (or unknown under `Include`)
    pub eligible: Vec<GcRoot>,
    /// Registered at or after the cutoff
    pub retained: Vec<GcRoot>,
    /// No registration record, excluded under `Exclude`
    pub unknown: Vec<GcRoot>,
}

impl AgeFilter {
    /// Filter for `cutoff`
    #[must_use]
    pub fn new(cutoff: Cutoff, unknown: UnknownAgePolicy) -> Self {
        Self { cutoff, unknown }
    }

    /// The cutoff in use
    #[must_use]
    pub fn cutoff(&self) -> Cutoff {
        self.cutoff
    }

    /// Whether a root registered at `registration` is eligible
    #[must_use]
    pub fn is_eligible(&self, registration: Registration) -> bool {
        match registration {
            Registration::Known(t) => t < self.cutoff.0,
            Registration::Unknown => self.unknown == UnknownAgePolicy::Include,
        }
    }

    /// Partition scanned roots
    #[must_use]
    pub fn select(&self, roots: Vec<GcRoot>) -> Selection {
        let mut selection = Selection::default();
        for root in roots {
            let registration = root.registration();
            if self.is_eligible(registration) {
                selection.eligible.push(root);
            } else if registration == Registration::Unknown {
                selection.unknown.push(root);
            } else {
                selection.retained.push(root);
            }
        }
        selection
    }
}

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+|an?)\s*([a-z]+)(?:\s+ago)?$").expect("static regex")
    })
}

enum Step {
    Fixed(Duration),
    Calendar(u32),
}

fn unit_step(unit: &str, n: i64, expr: &str) -> Result<Step, AgeParseError> {
    let out_of_range = || AgeParseError::OutOfRange(expr.to_string());
    let secs = |per: i64| {
        n.checked_mul(per)
            .and_then(Duration::try_seconds)
            .map(Step::Fixed)
            .ok_or_else(out_of_range)
    };
    let months = |per: i64| {
        n.checked_mul(per)
            .and_then(|m| u32::try_from(m).ok())
            .map(Step::Calendar)
            .ok_or_else(out_of_range)
    };

    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => secs(1),
        "m" | "min" | "mins" | "minute" | "minutes" => secs(60),
        "h" | "hr" | "hrs" | "hour" | "hours" => secs(3_600),
        "d" | "day" | "days" => secs(86_400),
        "w" | "wk" | "wks" | "week" | "weeks" => secs(604_800),
        "mo" | "month" | "months" => months(1),
        "y" | "yr" | "yrs" | "year" | "years" => months(12),
        _ => Err(AgeParseError::UnknownUnit {
            unit: unit.to_string(),
            expr: expr.to_string(),
        }),
    }
}

fn parse_cutoff<Tz: TimeZone>(
    expr: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Utc>, AgeParseError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(AgeParseError::Empty);
    }
    let lower = trimmed.to_ascii_lowercase();

    match lower.as_str() {
        "now" => return Ok(now.with_timezone(&Utc)),
        "today" => return local_midnight(now.date_naive(), now, trimmed),
        "yesterday" => {
            let day = now
                .date_naive()
                .pred_opt()
                .ok_or_else(|| AgeParseError::OutOfRange(trimmed.to_string()))?;
            return local_midnight(day, now, trimmed);
        }
        _ => {}
    }

    if let Some(caps) = relative_re().captures(&lower) {
        let n = match &caps[1] {
            "a" | "an" => 1,
            digits => digits
                .parse::<i64>()
                .map_err(|_| AgeParseError::OutOfRange(trimmed.to_string()))?,
        };
        let out_of_range = || AgeParseError::OutOfRange(trimmed.to_string());
        return match unit_step(&caps[2], n, trimmed)? {
            Step::Fixed(d) => now
                .clone()
                .checked_sub_signed(d)
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(out_of_range),
            Step::Calendar(m) => {
                let naive = now
                    .naive_local()
                    .checked_sub_months(Months::new(m))
                    .ok_or_else(out_of_range)?;
                localize_calendar(&naive, now, trimmed)
            }
        };
    }

    parse_absolute(trimmed, now)
}

fn parse_absolute<Tz: TimeZone>(
    expr: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Utc>, AgeParseError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(expr) {
        return Ok(t.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(expr, format) {
            return localize(&naive, now, expr);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(expr, "%Y-%m-%d") {
        return local_midnight(date, now, expr);
    }

    Err(AgeParseError::Unrecognized(expr.to_string()))
}

fn local_midnight<Tz: TimeZone>(
    date: NaiveDate,
    now: &DateTime<Tz>,
    expr: &str,
) -> Result<DateTime<Utc>, AgeParseError> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AgeParseError::OutOfRange(expr.to_string()))?;
    localize(&naive, now, expr)
}

fn localize<Tz: TimeZone>(
    naive: &NaiveDateTime,
    now: &DateTime<Tz>,
    expr: &str,
) -> Result<DateTime<Utc>, AgeParseError> {
    match now.timezone().from_local_datetime(naive) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(AgeParseError::NonexistentLocalTime(expr.to_string())),
    }
}

/// Like [`localize`], but a wall-clock time skipped by a DST transition
/// moves forward past the gap instead of failing.
fn localize_calendar<Tz: TimeZone>(
    naive: &NaiveDateTime,
    now: &DateTime<Tz>,
    expr: &str,
) -> Result<DateTime<Utc>, AgeParseError> {
    match localize(naive, now, expr) {
        Err(AgeParseError::NonexistentLocalTime(_)) => {
            let shifted = naive
                .checked_add_signed(Duration::hours(1))
                .ok_or_else(|| AgeParseError::OutOfRange(expr.to_string()))?;
            localize(&shifted, now, expr)
        }
        other => other,
    }
}
