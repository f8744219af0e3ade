use crate::error::{ChurnError, Result};
use crate::model::DATE_FORMAT;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parses RFC3339, `YYYY-MM-DD`, `YYYY/MM/DD HH:MM:SS`, or a duration such
/// as `90days` meaning that long before now. Naive inputs are read as UTC.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(datetime) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&datetime));
        }
    }

    if let Ok(datetime) = NaiveDateTime::parse_from_str(input, DATE_FORMAT) {
        return Ok(Utc.from_utc_datetime(&datetime));
    }

    if let Ok(duration) = humantime::parse_duration(input.trim_end_matches(" ago")) {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|_| ChurnError::InvalidDate(format!("Duration overflow for '{input}'")))?;
        return Utc::now()
            .checked_sub_signed(duration)
            .ok_or_else(|| ChurnError::InvalidDate(format!("Duration overflow for '{input}'")));
    }

    Err(ChurnError::InvalidDate(format!("Unrecognised date '{input}'")))
}

/// Like [`parse_timestamp`] but for window bounds, which are naive.
pub fn parse_window_bound(input: &str) -> Result<NaiveDateTime> {
    parse_timestamp(input).map(|dt| dt.naive_utc())
}
