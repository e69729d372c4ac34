use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{format_description::FormatItem, macros::format_description, Date, Duration};

pub const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
pub const DEFAULT_RANGE_DAYS: i64 = 15;
pub const MAX_LOOKBACK_YEARS: i32 = 5;

static DATED_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d{4}-\d{2}-\d{2})\.csv$").expect("static regex compiles"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid date {0:?}; expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("start date {start} is after end date {end}")]
    StartAfterEnd { start: String, end: String },
    #[error("end date {end} is in the future (today is {today})")]
    EndInFuture { end: String, today: String },
    #[error("start date {start} is more than five years back (earliest is {earliest})")]
    StartTooOld { start: String, earliest: String },
    #[error("no report named {}", .0.join(", "))]
    UnknownReports(Vec<String>),
}

/// Entry as the portal returns it; either field may be missing.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalReport {
    #[serde(rename = "ReportName", default)]
    pub name: Option<String>,
    #[serde(rename = "ReportBlobUri", default)]
    pub blob_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportDescriptor {
    pub name: String,
    pub blob_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_date")]
    pub date: Option<Date>,
}

impl ReportDescriptor {
    pub fn new(name: impl Into<String>, blob_uri: impl Into<String>) -> Self {
        let name = name.into();
        let date = extract_date(&name);
        Self {
            name,
            blob_uri: blob_uri.into(),
            date,
        }
    }
}

impl PortalReport {
    /// Entries without a name or a blob URI are unusable and dropped.
    pub fn into_descriptor(self) -> Option<ReportDescriptor> {
        let name = self.name.filter(|name| !name.trim().is_empty())?;
        let uri = self.blob_uri.filter(|uri| !uri.trim().is_empty())?;
        Some(ReportDescriptor::new(name, uri))
    }
}

/// Reports are named `<anything>_YYYY-MM-DD.csv`.
pub fn extract_date(name: &str) -> Option<Date> {
    let captures = DATED_NAME_RE.captures(name)?;
    Date::parse(captures.get(1)?.as_str(), DATE_FORMAT).ok()
}

pub fn parse_date(value: &str) -> Result<Date, CatalogError> {
    Date::parse(value.trim(), DATE_FORMAT).map_err(|_| CatalogError::InvalidDate(value.into()))
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_else(|_| date.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date, today: Date) -> Result<Self, CatalogError> {
        if start > end {
            return Err(CatalogError::StartAfterEnd {
                start: format_date(start),
                end: format_date(end),
            });
        }
        if end > today {
            return Err(CatalogError::EndInFuture {
                end: format_date(end),
                today: format_date(today),
            });
        }
        let earliest = earliest_allowed(today);
        if start < earliest {
            return Err(CatalogError::StartTooOld {
                start: format_date(start),
                earliest: format_date(earliest),
            });
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending today (inclusive of both ends).
    pub fn last_days(days: i64, today: Date) -> Self {
        let earliest = earliest_allowed(today);
        let start = today
            .checked_sub(Duration::days(days.max(0)))
            .unwrap_or(earliest)
            .max(earliest);
        Self { start, end: today }
    }

    /// Resolves optional CLI bounds against the default window. A start
    /// derived from `default_days` never reaches past the lookback limit;
    /// an explicit `from` is validated as given.
    pub fn resolve(
        from: Option<Date>,
        to: Option<Date>,
        default_days: i64,
        today: Date,
    ) -> Result<Self, CatalogError> {
        let end = to.unwrap_or(today);
        let start = match from {
            Some(start) => start,
            None => {
                let earliest = earliest_allowed(today);
                end.checked_sub(Duration::days(default_days.max(0)))
                    .unwrap_or(earliest)
                    .max(earliest)
                    .min(end)
            }
        };
        Self::new(start, end, today)
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", format_date(self.start), format_date(self.end))
    }
}

fn earliest_allowed(today: Date) -> Date {
    today
        .replace_year(today.year() - MAX_LOOKBACK_YEARS)
        .or_else(|_| {
            // Feb 29 has no counterpart in most years.
            today
                .replace_day(28)
                .and_then(|day| day.replace_year(today.year() - MAX_LOOKBACK_YEARS))
        })
        .unwrap_or(Date::MIN)
}

/// Keeps reports whose name carries a date inside `range`; undated reports
/// never match.
pub fn filter_by_range(reports: Vec<ReportDescriptor>, range: &DateRange) -> Vec<ReportDescriptor> {
    reports
        .into_iter()
        .filter(|report| report.date.map(|date| range.contains(date)).unwrap_or(false))
        .collect()
}

pub fn find_by_name(
    reports: &[ReportDescriptor],
    names: &[String],
) -> Result<Vec<ReportDescriptor>, CatalogError> {
    let mut selected = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match reports.iter().find(|report| &report.name == name) {
            Some(report) => selected.push(report.clone()),
            None => missing.push(name.clone()),
        }
    }
    if missing.is_empty() {
        Ok(selected)
    } else {
        Err(CatalogError::UnknownReports(missing))
    }
}

mod optional_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    use super::{format_date, DATE_FORMAT};

    pub fn serialize<S: Serializer>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&format_date(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Date>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|value| Date::parse(&value, DATE_FORMAT).map_err(serde::de::Error::custom))
            .transpose()
    }
}
