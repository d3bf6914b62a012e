//! Schedule expressions.
//!
//! Three forms are accepted:
//!
//! - `every <n><unit>` with unit `s`, `m`, `h`, `d` or `w`: a fixed interval
//!   measured from the previous run.
//! - `@hourly`, `@daily` (`@midnight`), `@weekly`, `@monthly`, `@yearly`
//!   (`@annually`).
//! - Five-field cron, `minute hour day-of-month month day-of-week`, with `*`,
//!   numbers, ranges `a-b`, lists `a,b` and steps `*/n`, `a-b/n`. Day of
//!   week runs 0-7 where both 0 and 7 are Sunday. When both day fields are
//!   restricted a day matches if either does.
//!
//! Calendar expressions are evaluated in UTC.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use std::str::FromStr;

/// Eight years covers every valid expression, including Feb 29 on a given
/// weekday.
const MAX_SEARCH_DAYS: u32 = 366 * 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    Cron(CronExpr),
}

impl Schedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(invalid(expression, "empty schedule"));
        }

        if let Some(interval) = expression.strip_prefix("every") {
            return parse_interval(expression, interval.trim()).map(Schedule::Every);
        }

        let cron = match expression.to_ascii_lowercase().as_str() {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other if other.starts_with('@') => {
                return Err(invalid(expression, "unknown macro"));
            }
            _ => expression,
        };
        CronExpr::parse(cron)
            .map(Schedule::Cron)
            .map_err(|reason| invalid(expression, &reason))
    }

    /// Decides whether a run is due at `now`.
    ///
    /// Intervals are due when there is no previous run or the interval has
    /// fully elapsed. Calendar schedules are due when a fire time falls in
    /// `(reference, now]`, where the reference is the previous run or, for a
    /// policy that never ran, the moment it was first observed.
    pub fn is_due(
        &self,
        last_run: Option<DateTime<Utc>>,
        first_seen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        match self {
            Schedule::Every(interval) => match last_run {
                None => true,
                Some(last) => now >= last + *interval,
            },
            Schedule::Cron(expr) => {
                let reference = last_run.unwrap_or(first_seen);
                expr.next_after(reference).is_some_and(|fire| fire <= now)
            }
        }
    }

    /// Earliest time a run could become due after `after`.
    pub fn next_after(
        &self,
        last_run: Option<DateTime<Utc>>,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Every(interval) => Some(match last_run {
                Some(last) => (last + *interval).max(after),
                None => after,
            }),
            Schedule::Cron(expr) => expr.next_after(after),
        }
    }
}

impl FromStr for Schedule {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Schedule::parse(s)
    }
}

fn invalid(expression: &str, reason: &str) -> EngineError {
    EngineError::Validation(format!("invalid schedule {expression:?}: {reason}"))
}

fn parse_interval(expression: &str, interval: &str) -> Result<Duration> {
    let split = interval
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| invalid(expression, "missing interval unit"))?;
    let (digits, unit) = interval.split_at(split);
    let amount: i64 = digits
        .parse()
        .map_err(|_| invalid(expression, "missing interval amount"))?;
    if amount == 0 {
        return Err(invalid(expression, "interval must be positive"));
    }

    let duration = match unit.trim() {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => return Err(invalid(expression, "unit must be one of s, m, h, d, w")),
    };
    duration.ok_or_else(|| invalid(expression, "interval too large"))
}

/// Set of allowed values for one cron field, as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field(u64);

impl Field {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minutes: Field,
    hours: Field,
    days_of_month: Field,
    months: Field,
    days_of_week: Field,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    fn parse(expression: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!("expected 5 fields, found {}", fields.len()));
        }

        let mut days_of_week = parse_field(fields[4], 0, 7, "day-of-week")?;
        if days_of_week.contains(7) {
            days_of_week = Field((days_of_week.0 | 1) & !(1 << 7));
        }

        Ok(Self {
            minutes: parse_field(fields[0], 0, 59, "minute")?,
            hours: parse_field(fields[1], 0, 23, "hour")?,
            days_of_month: parse_field(fields[2], 1, 31, "day-of-month")?,
            months: parse_field(fields[3], 1, 12, "month")?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// First fire time strictly after `after`, at minute resolution.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let mut date = start.date_naive();

        for day in 0..MAX_SEARCH_DAYS {
            if self.matches_date(date) {
                let (hour, minute) = if day == 0 {
                    (start.hour(), start.minute())
                } else {
                    (0, 0)
                };
                if let Some((h, m)) = self.first_time_from(hour, minute) {
                    return date.and_hms_opt(h, m, 0).map(|t| t.and_utc());
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        if !self.months.contains(date.month()) {
            return false;
        }
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    fn first_time_from(&self, hour: u32, minute: u32) -> Option<(u32, u32)> {
        (hour..24)
            .filter(|h| self.hours.contains(*h))
            .find_map(|h| {
                let from = if h == hour { minute } else { 0 };
                (from..60).find(|m| self.minutes.contains(*m)).map(|m| (h, m))
            })
    }
}

fn parse_field(spec: &str, min: u32, max: u32, label: &str) -> std::result::Result<Field, String> {
    let mut mask = 0u64;
    for part in spec.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid {label} step {step:?}"))?;
                if step == 0 {
                    return Err(format!("{label} step must be positive"));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, label)?, parse_value(b, label)?)
        } else {
            let value = parse_value(range, label)?;
            // `a/n` runs from `a` to the end of the field
            if part.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };

        if start < min || end > max || start > end {
            return Err(format!(
                "{label} range {range:?} outside {min}-{max}"
            ));
        }
        for value in (start..=end).step_by(step as usize) {
            mask |= 1 << value;
        }
    }
    Ok(Field(mask))
}

fn parse_value(value: &str, label: &str) -> std::result::Result<u32, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {label} value {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn cron(expression: &str) -> CronExpr {
        match Schedule::parse(expression).unwrap() {
            Schedule::Cron(expr) => expr,
            other => panic!("expected cron, got {other:?}"),
        }
    }

    #[test]
    fn parses_intervals() {
        assert_eq!(
            Schedule::parse("every 24h").unwrap(),
            Schedule::Every(Duration::hours(24))
        );
        assert_eq!(
            Schedule::parse("every 90s").unwrap(),
            Schedule::Every(Duration::seconds(90))
        );
        assert_eq!(
            Schedule::parse("every 2w").unwrap(),
            Schedule::Every(Duration::weeks(2))
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in [
            "",
            "every",
            "every 0h",
            "every 5y",
            "every h",
            "@fortnightly",
            "* * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "a * * * *",
        ] {
            assert!(Schedule::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn daily_macro_fires_at_midnight() {
        let expr = cron("@daily");

        assert_eq!(
            expr.next_after(at(2026, 3, 14, 13, 5, 10)),
            Some(at(2026, 3, 15, 0, 0, 0))
        );
        // strictly after: a reference exactly on a fire time moves on
        assert_eq!(
            expr.next_after(at(2026, 3, 15, 0, 0, 0)),
            Some(at(2026, 3, 16, 0, 0, 0))
        );
    }

    #[test]
    fn weekly_macro_fires_on_sunday() {
        // 2026-03-14 is a Saturday
        let expr = cron("@weekly");

        assert_eq!(
            expr.next_after(at(2026, 3, 14, 12, 0, 0)),
            Some(at(2026, 3, 15, 0, 0, 0))
        );
    }

    #[test]
    fn monthly_and_yearly_macros() {
        assert_eq!(
            cron("@monthly").next_after(at(2026, 1, 31, 23, 59, 0)),
            Some(at(2026, 2, 1, 0, 0, 0))
        );
        assert_eq!(
            cron("@yearly").next_after(at(2026, 6, 1, 0, 0, 0)),
            Some(at(2027, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn steps_and_ranges() {
        let expr = cron("*/15 9-17 * * 1-5");

        // Friday 17:50 rolls over the weekend to Monday 09:00
        assert_eq!(
            expr.next_after(at(2026, 3, 13, 17, 50, 0)),
            Some(at(2026, 3, 16, 9, 0, 0))
        );
        assert_eq!(
            expr.next_after(at(2026, 3, 16, 9, 1, 0)),
            Some(at(2026, 3, 16, 9, 15, 0))
        );
    }

    #[test]
    fn lists_and_sunday_as_seven() {
        let expr = cron("30 2,14 * * 7");

        // 2026-03-15 is a Sunday
        assert_eq!(
            expr.next_after(at(2026, 3, 15, 3, 0, 0)),
            Some(at(2026, 3, 15, 14, 30, 0))
        );
    }

    #[test]
    fn restricted_day_fields_match_either() {
        // the 1st of the month or any Monday
        let expr = cron("0 0 1 * 1");

        // 2026-03-02 is a Monday
        assert_eq!(
            expr.next_after(at(2026, 3, 1, 12, 0, 0)),
            Some(at(2026, 3, 2, 0, 0, 0))
        );
    }

    #[test]
    fn leap_day_is_found() {
        assert_eq!(
            cron("0 0 29 2 *").next_after(at(2026, 3, 1, 0, 0, 0)),
            Some(at(2028, 2, 29, 0, 0, 0))
        );
    }

    #[test]
    fn interval_due_rule() {
        let schedule = Schedule::parse("every 24h").unwrap();
        let last = at(2026, 3, 14, 0, 0, 0);

        assert!(schedule.is_due(None, last, last));
        assert!(!schedule.is_due(Some(last), last, last + Duration::hours(23)));
        assert!(schedule.is_due(Some(last), last, last + Duration::hours(24)));
    }

    #[test]
    fn calendar_due_rule_waits_for_first_fire_after_first_seen() {
        let schedule = Schedule::parse("@hourly").unwrap();
        let seen = at(2026, 3, 14, 10, 20, 0);

        assert!(!schedule.is_due(None, seen, seen));
        assert!(!schedule.is_due(None, seen, at(2026, 3, 14, 10, 59, 59)));
        assert!(schedule.is_due(None, seen, at(2026, 3, 14, 11, 0, 0)));
        assert!(!schedule.is_due(
            Some(at(2026, 3, 14, 11, 0, 30)),
            seen,
            at(2026, 3, 14, 11, 30, 0)
        ));
    }
}
