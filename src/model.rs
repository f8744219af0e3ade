use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 2;

/// Wall-clock format used for record timestamps in persisted output.
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDelta {
    pub path: String,
    #[serde(default)]
    pub added: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub before_lines: u64,
    #[serde(default)]
    pub after_lines: u64,
}

impl FileDelta {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            added: 0,
            deleted: 0,
            before_lines: 0,
            after_lines: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.deleted == 0 && self.before_lines == 0 && self.after_lines == 0
    }
}

/// One decoded commit. Immutable once produced by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub file_deltas: Vec<FileDelta>,
}

impl Changeset {
    /// Calendar day the changeset is bucketed under.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Churn for one file on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnRecord {
    #[serde(with = "record_timestamp")]
    pub timestamp: NaiveDateTime,
    pub file_name: String,
    #[serde(default)]
    pub added: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub changes_before: u64,
    #[serde(default)]
    pub changes_after: u64,
    #[serde(default)]
    pub number_of_changes: u64,
    #[serde(default)]
    pub added_with_fixes: u64,
    #[serde(default)]
    pub deleted_with_fixes: u64,
    #[serde(default)]
    pub number_of_changes_with_fixes: u64,
}

impl ChurnRecord {
    pub fn new(day: NaiveDate, file_name: impl Into<String>) -> Self {
        Self {
            timestamp: day.and_time(chrono::NaiveTime::MIN),
            file_name: file_name.into(),
            added: 0,
            deleted: 0,
            changes_before: 0,
            changes_after: 0,
            number_of_changes: 0,
            added_with_fixes: 0,
            deleted_with_fixes: 0,
            number_of_changes_with_fixes: 0,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name).extension().and_then(|e| e.to_str())
    }

    pub fn total_lines_changed(&self) -> u64 {
        self.added + self.deleted + self.changes_before + self.changes_after
    }

    pub fn total_lines_changed_with_fixes(&self) -> u64 {
        self.added_with_fixes + self.deleted_with_fixes
    }

    pub fn add_delta(&mut self, delta: &FileDelta, is_fix: bool) {
        self.added += delta.added;
        self.deleted += delta.deleted;
        self.changes_before += delta.before_lines;
        self.changes_after += delta.after_lines;
        self.number_of_changes += 1;
        if is_fix {
            self.added_with_fixes += delta.added;
            self.deleted_with_fixes += delta.deleted;
            self.number_of_changes_with_fixes += 1;
        }
    }
}

/// A bug-tracker entry correlated to a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub changeset_id: String,
    #[serde(default)]
    pub work_item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl WorkItem {
    pub fn new(changeset_id: impl Into<String>, work_item_id: impl Into<String>) -> Self {
        Self {
            changeset_id: changeset_id.into(),
            work_item_id: work_item_id.into(),
            closed_date: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Whether output lands in one artifact or one artifact per day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    #[default]
    SingleFile,
    MultipleFile,
}

/// Half-open `[since, until)` range used to select history.
#[derive(Debug, Clone)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new() -> Self {
        Self { since: None, until: None }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if timestamp < &since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if timestamp >= &until {
                return false;
            }
        }
        true
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::new()
    }
}

mod record_timestamp {
    use super::DATE_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}
