use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Week,
    Month,
}

/// Half-open calendar bucket `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub label: String,
    #[serde(serialize_with = "serialize_instant")]
    pub start: DateTime<Utc>,
    #[serde(serialize_with = "serialize_instant")]
    pub end: DateTime<Utc>,
}

fn serialize_instant<S: serde::Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339())
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

pub fn month_start(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive().with_day(1).unwrap_or_else(|| now.date_naive())
}

/// Monday of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today - Duration::days(today.weekday().num_days_from_monday() as i64)
}

/// `count` consecutive buckets, oldest first, the last one containing `now`.
///
/// Months follow calendar boundaries and are labelled `T{month}`; weeks run Monday to
/// Monday and are labelled `Tuần {n}` by position.
pub fn windows(now: DateTime<Utc>, count: usize, granularity: Granularity) -> Vec<TimeWindow> {
    let mut out = Vec::with_capacity(count);
    match granularity {
        Granularity::Month => {
            let current = month_start(now);
            for back in (0..count).rev() {
                let Some(start) = current.checked_sub_months(Months::new(back as u32)) else {
                    continue;
                };
                let Some(end) = start.checked_add_months(Months::new(1)) else {
                    continue;
                };
                out.push(TimeWindow {
                    label: format!("T{}", start.month()),
                    start: midnight(start),
                    end: midnight(end),
                });
            }
        }
        Granularity::Week => {
            let current = week_start(now);
            for (pos, back) in (0..count).rev().enumerate() {
                let start = current - Duration::weeks(back as i64);
                let end = start + Duration::weeks(1);
                out.push(TimeWindow {
                    label: format!("Tuần {}", pos + 1),
                    start: midnight(start),
                    end: midnight(end),
                });
            }
        }
    }
    out
}

/// The single bucket containing `now`.
pub fn current(now: DateTime<Utc>, granularity: Granularity) -> TimeWindow {
    let start = match granularity {
        Granularity::Week => week_start(now),
        Granularity::Month => month_start(now),
    };
    let end = match granularity {
        Granularity::Week => start + Duration::weeks(1),
        Granularity::Month => start
            .checked_add_months(Months::new(1))
            .unwrap_or(start + Duration::days(31)),
    };
    TimeWindow {
        label: String::new(),
        start: midnight(start),
        end: midnight(end),
    }
}
