//! Bug-tracker correlation: which changesets were fixes.
//!
//! A provider exports work items into JSON files next to the configured
//! bug-database output file; later runs rehydrate a [`WorkItemCache`] from
//! every `*.json` file in that directory and consult it while folding
//! changesets into the ledger.

pub mod provider;

pub use provider::{BugDatabaseProvider, BuiltinProviders, JsonFileProvider, ProviderLoader, WorkItemsByDate};

use crate::error::{ChurnError, Result};
use crate::model::{OutputType, WorkItem};
use crate::output::OutputSink;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Answers whether a changeset is correlated to a work item.
pub trait BugCorrelationIndex {
    fn lookup(&self, changeset_id: &str) -> Option<&WorkItem>;
}

/// Work items keyed by changeset id. Later inserts replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct WorkItemCache {
    items: HashMap<String, WorkItem>,
}

impl WorkItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: WorkItem) {
        self.items.insert(item.changeset_id.clone(), item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Extend<WorkItem> for WorkItemCache {
    fn extend<I: IntoIterator<Item = WorkItem>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl FromIterator<WorkItem> for WorkItemCache {
    fn from_iter<I: IntoIterator<Item = WorkItem>>(iter: I) -> Self {
        let mut cache = Self::new();
        cache.extend(iter);
        cache
    }
}

impl BugCorrelationIndex for WorkItemCache {
    fn lookup(&self, changeset_id: &str) -> Option<&WorkItem> {
        self.items.get(changeset_id)
    }
}

/// Where and how the bug database export is configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BugDatabaseSettings {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    #[serde(default)]
    pub output_type: OutputType,
}

impl BugDatabaseSettings {
    fn provider(&self) -> Option<&str> {
        self.provider.as_deref().filter(|p| !p.is_empty())
    }

    fn output_file(&self) -> Option<&Path> {
        self.output_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Runs the configured provider and persists what it reports.
///
/// Returns `Ok(false)` when no provider is configured or the provider had
/// nothing to report.
pub fn collect_bug_database_cache<L, O>(
    settings: &BugDatabaseSettings,
    loader: &L,
    sink: &O,
) -> Result<bool>
where
    L: ProviderLoader + ?Sized,
    O: OutputSink + ?Sized,
{
    let Some(provider_name) = settings.provider() else {
        return Ok(false);
    };
    let Some(output_file) = settings.output_file() else {
        return Err(ChurnError::BugDatabaseWithoutOutput);
    };

    let provider = loader.load(provider_name, &settings.args)?;
    let Some(work_items) = provider.process()? else {
        return Ok(false);
    };
    if work_items.is_empty() {
        return Ok(false);
    }

    sink.process_output(settings.output_type, output_file, &work_items)?;
    Ok(true)
}

/// Reads every `*.json` file in `directory` as a list of work items.
///
/// Unreadable directories and files that do not parse contribute nothing.
pub fn for_each_cached_work_item(directory: &Path) -> Vec<WorkItem> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %directory.display(), error = %e, "cannot read work item cache");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut items = Vec::new();
    for file in files {
        tracing::info!("Processing {}", file.display());
        match read_work_items(&file) {
            Ok(mut parsed) => items.append(&mut parsed),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable work item file");
            }
        }
    }
    items
}

fn read_work_items(path: &Path) -> Result<Vec<WorkItem>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Seeds `cache` from the directory holding the bug-database output file.
///
/// Returns the number of work items read.
pub fn process_cache(output_file: Option<&Path>, cache: &mut WorkItemCache) -> usize {
    let Some(output_file) = output_file.filter(|p| !p.as_os_str().is_empty()) else {
        return 0;
    };
    let directory = match output_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let items = for_each_cached_work_item(&directory);
    let count = items.len();
    cache.extend(items);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Dated;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde::Serialize;
    use std::cell::{Cell, RefCell};
    use tempfile::tempdir;

    struct StubProvider(Option<WorkItemsByDate>);

    impl BugDatabaseProvider for StubProvider {
        fn process(&self) -> Result<Option<WorkItemsByDate>> {
            Ok(self.0.clone())
        }
    }

    struct StubLoader {
        result: Option<WorkItemsByDate>,
        calls: Cell<usize>,
    }

    impl StubLoader {
        fn new(result: Option<WorkItemsByDate>) -> Self {
            Self { result, calls: Cell::new(0) }
        }
    }

    impl ProviderLoader for StubLoader {
        fn load(&self, _provider: &str, _args: &[String]) -> Result<Box<dyn BugDatabaseProvider>> {
            self.calls.set(self.calls.get() + 1);
            Ok(Box::new(StubProvider(self.result.clone())))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: RefCell<Vec<(OutputType, PathBuf)>>,
    }

    impl OutputSink for RecordingSink {
        fn process_output<T: Serialize>(
            &self,
            output_type: OutputType,
            output_file: &Path,
            _data: &Dated<T>,
        ) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((output_type, output_file.to_path_buf()));
            Ok(())
        }
    }

    fn settings(provider: &str, output: Option<&str>) -> BugDatabaseSettings {
        BugDatabaseSettings {
            provider: Some(provider.to_string()),
            output_file: output.map(PathBuf::from),
            output_type: OutputType::MultipleFile,
            ..Default::default()
        }
    }

    fn one_item() -> WorkItemsByDate {
        let mut mapping = WorkItemsByDate::new();
        let day = NaiveDate::from_ymd_opt(2018, 9, 17).unwrap();
        mapping
            .entry(day)
            .or_default()
            .insert("BUG-1".into(), WorkItem::new("101", "BUG-1"));
        mapping
    }

    #[test]
    fn no_provider_skips_loading() {
        let loader = StubLoader::new(None);
        let sink = RecordingSink::default();
        let empty = BugDatabaseSettings {
            provider: Some(String::new()),
            ..Default::default()
        };

        assert!(!collect_bug_database_cache(&empty, &loader, &sink).unwrap());
        assert_eq!(loader.calls.get(), 0);
    }

    #[test]
    fn provider_without_output_file_is_fatal() {
        let loader = StubLoader::new(Some(one_item()));
        let sink = RecordingSink::default();

        let err = collect_bug_database_cache(&settings("some/path/to.dll", None), &loader, &sink)
            .unwrap_err();

        assert_eq!(err.to_string(), "Dll specified without known output file");
        assert_eq!(loader.calls.get(), 0);
    }

    #[test]
    fn provider_with_nothing_to_report_writes_nothing() {
        let loader = StubLoader::new(None);
        let sink = RecordingSink::default();

        let wrote = collect_bug_database_cache(
            &settings("json-file", Some("some/path/to/output/files")),
            &loader,
            &sink,
        )
        .unwrap();

        assert!(!wrote);
        assert!(sink.calls.borrow().is_empty());
    }

    #[test]
    fn provider_output_goes_to_configured_file() {
        let loader = StubLoader::new(Some(one_item()));
        let sink = RecordingSink::default();

        collect_bug_database_cache(
            &settings("json-file", Some("some/path/to/output/files")),
            &loader,
            &sink,
        )
        .unwrap();

        assert_eq!(
            *sink.calls.borrow(),
            vec![(OutputType::MultipleFile, PathBuf::from("some/path/to/output/files"))]
        );
    }

    #[test]
    fn rehydrates_every_json_file_with_last_write_winning() {
        let dir = tempdir().unwrap();
        let first = vec![WorkItem::new("1", "A"), WorkItem::new("2", "B")];
        let second = vec![WorkItem::new("2", "C")];
        fs::write(dir.path().join("a.json"), serde_json::to_string(&first).unwrap()).unwrap();
        fs::write(dir.path().join("b.json"), serde_json::to_string(&second).unwrap()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let mut cache = WorkItemCache::new();
        let read = process_cache(Some(&dir.path().join("bugs.json")), &mut cache);

        assert_eq!(read, 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("2").unwrap().work_item_id, "C");
        assert!(cache.lookup("3").is_none());
    }

    #[test]
    fn every_exported_fix_survives_rehydration() {
        use crate::output::JsonOutputProcessor;

        let dir = tempdir().unwrap();
        let export = dir.path().join("export.json");
        let closed = Utc.with_ymd_and_hms(2018, 9, 17, 9, 0, 0).unwrap();
        let mut first = WorkItem::new("101", "BUG-1");
        first.closed_date = Some(closed);
        let mut second = WorkItem::new("102", "BUG-1");
        second.closed_date = Some(closed);
        let undated = WorkItem::new("103", "BUG-2");
        fs::write(&export, serde_json::to_string(&vec![first, second, undated]).unwrap()).unwrap();

        let settings = BugDatabaseSettings {
            provider: Some(JsonFileProvider::NAME.to_string()),
            args: vec![export.display().to_string()],
            output_file: Some(dir.path().join("workitems/bugs.json")),
            output_type: OutputType::MultipleFile,
        };
        assert!(collect_bug_database_cache(&settings, &BuiltinProviders, &JsonOutputProcessor).unwrap());

        let mut cache = WorkItemCache::new();
        process_cache(settings.output_file.as_deref(), &mut cache);
        for id in ["101", "102", "103"] {
            assert!(cache.lookup(id).is_some(), "changeset {id} lost");
        }
    }

    #[test]
    fn missing_cache_directory_yields_nothing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(for_each_cached_work_item(&missing).is_empty());

        let mut cache = WorkItemCache::new();
        assert_eq!(process_cache(None, &mut cache), 0);
        assert!(cache.is_empty());
    }
}
