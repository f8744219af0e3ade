//! Windowed conversion of churn records into dashboard measures.
//!
//! A [`MeasureConverter`] looks at one record at a time and merges its value
//! into a [`MeasureCollection`] additively, so a collection loaded from a
//! previous run keeps growing instead of being overwritten.

use crate::model::ChurnRecord;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which record counter a metric reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MeasureConverterType {
    LinesChanged,
    NumberOfChanges,
    LinesChangedWithFixes,
    NumberOfChangesWithFixes,
}

impl MeasureConverterType {
    pub fn value_of(self, record: &ChurnRecord) -> u64 {
        match self {
            Self::LinesChanged => record.total_lines_changed(),
            Self::NumberOfChanges => record.number_of_changes,
            Self::LinesChangedWithFixes => record.total_lines_changed_with_fixes(),
            Self::NumberOfChangesWithFixes => record.number_of_changes_with_fixes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    #[serde(rename = "type")]
    pub converter: MeasureConverterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Metric {
    pub fn new(key: impl Into<String>, converter: MeasureConverterType) -> Self {
        Self {
            key: key.into(),
            converter,
            name: None,
            description: None,
            domain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub metric_key: String,
    pub file: String,
    pub value: u64,
}

/// Metrics seen so far plus one measure per `(metric_key, file)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureCollection {
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub measures: Vec<Measure>,
}

impl MeasureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_metric(&mut self, metric: &Metric) {
        if !self.metrics.iter().any(|m| m.key == metric.key) {
            self.metrics.push(metric.clone());
        }
    }

    /// Adds into an existing `(metric_key, file)` entry or appends a new one.
    pub fn add_measure(&mut self, measure: Measure) {
        match self
            .measures
            .iter_mut()
            .find(|m| m.metric_key == measure.metric_key && m.file == measure.file)
        {
            Some(existing) => existing.value += measure.value,
            None => self.measures.push(measure),
        }
    }

    pub fn measure(&self, metric_key: &str, file: &str) -> Option<&Measure> {
        self.measures
            .iter()
            .find(|m| m.metric_key == metric_key && m.file == file)
    }
}

/// Converts records falling in `[window_start, window_end)` for one metric.
#[derive(Debug, Clone)]
pub struct MeasureConverter {
    window_start: NaiveDateTime,
    window_end: NaiveDateTime,
    metric: Metric,
    file_prefix: Option<String>,
}

impl MeasureConverter {
    pub fn new(
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        metric: Metric,
        file_prefix: Option<String>,
    ) -> Self {
        Self {
            window_start,
            window_end,
            metric,
            file_prefix: file_prefix.filter(|p| !p.is_empty()),
        }
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Compared at full precision, although records sit at midnight.
    pub fn in_window(&self, timestamp: &NaiveDateTime) -> bool {
        *timestamp >= self.window_start && *timestamp < self.window_end
    }

    pub fn file_label<'a>(&self, file_name: &'a str) -> &'a str {
        match &self.file_prefix {
            Some(prefix) => file_name.strip_prefix(prefix.as_str()).unwrap_or(file_name),
            None => file_name,
        }
    }

    /// Merges the record's value into `collection`.
    ///
    /// Not idempotent: the same record processed twice counts twice. Use a
    /// [`ConversionPass`] when the input may repeat records.
    pub fn process(&self, record: &ChurnRecord, collection: &mut MeasureCollection) {
        if !self.in_window(&record.timestamp) {
            return;
        }
        let value = self.metric.converter.value_of(record);
        if value == 0 {
            return;
        }

        collection.add_measure(Measure {
            metric_key: self.metric.key.clone(),
            file: self.file_label(&record.file_name).to_string(),
            value,
        });
        collection.add_metric(&self.metric);
    }
}

/// One conversion run over a collection that ignores repeated
/// `(record, metric)` pairs.
#[derive(Debug)]
pub struct ConversionPass<'a> {
    collection: &'a mut MeasureCollection,
    seen: HashSet<(NaiveDateTime, String, String)>,
}

impl<'a> ConversionPass<'a> {
    pub fn new(collection: &'a mut MeasureCollection) -> Self {
        Self {
            collection,
            seen: HashSet::new(),
        }
    }

    /// Returns `false` when this record was already converted for the
    /// converter's metric during this pass.
    pub fn process(&mut self, converter: &MeasureConverter, record: &ChurnRecord) -> bool {
        let key = (
            record.timestamp,
            record.file_name.clone(),
            converter.metric().key.clone(),
        );
        if !self.seen.insert(key) {
            tracing::debug!(
                file = %record.file_name,
                metric = %converter.metric().key,
                "record already converted in this pass"
            );
            return false;
        }
        converter.process(record, self.collection);
        true
    }
}
