use crate::bugdb::BugCorrelationIndex;
use crate::model::{Changeset, ChurnRecord};
use crate::output::Dated;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerKey {
    pub day: NaiveDate,
    pub file_name: String,
}

/// Per-day, per-file churn folded from a stream of changesets.
///
/// Totals do not depend on the order changesets arrive in.
#[derive(Debug, Clone, Default)]
pub struct ChurnLedger {
    records: BTreeMap<LedgerKey, ChurnRecord>,
}

impl ChurnLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate<I>(&mut self, changeset: &Changeset, index: &I)
    where
        I: BugCorrelationIndex + ?Sized,
    {
        let day = changeset.day();
        let is_fix = index.lookup(&changeset.id).is_some();

        for delta in &changeset.file_deltas {
            let key = LedgerKey {
                day,
                file_name: delta.path.clone(),
            };
            self.records
                .entry(key)
                .or_insert_with(|| ChurnRecord::new(day, delta.path.as_str()))
                .add_delta(delta, is_fix);
        }
    }

    pub fn get(&self, day: NaiveDate, file_name: &str) -> Option<&ChurnRecord> {
        self.records.get(&LedgerKey {
            day,
            file_name: file_name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn days(&self) -> usize {
        let mut days: Vec<NaiveDate> = self.records.keys().map(|k| k.day).collect();
        days.dedup();
        days.len()
    }

    /// Records ordered by day, then file name.
    pub fn records(&self) -> impl Iterator<Item = &ChurnRecord> {
        self.records.values()
    }

    /// Nested `day -> file -> record` view handed to output sinks.
    pub fn by_date(&self) -> Dated<ChurnRecord> {
        let mut nested: Dated<ChurnRecord> = BTreeMap::new();
        for (key, record) in &self.records {
            nested
                .entry(key.day)
                .or_default()
                .insert(key.file_name.clone(), record.clone());
        }
        nested
    }
}
