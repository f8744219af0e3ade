use crate::error::{ChurnError, Result};
use crate::model::WorkItem;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Work items grouped by day, then by a provider-chosen item key.
pub type WorkItemsByDate = BTreeMap<NaiveDate, BTreeMap<String, WorkItem>>;

/// A bug-tracking backend able to report the work items it knows about.
///
/// `Ok(None)` means the backend had nothing to report; it is not an error.
pub trait BugDatabaseProvider {
    fn process(&self) -> Result<Option<WorkItemsByDate>>;
}

/// Resolves a configured provider name and its arguments to an adapter.
pub trait ProviderLoader {
    fn load(&self, provider: &str, args: &[String]) -> Result<Box<dyn BugDatabaseProvider>>;
}

/// Adapters compiled into this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinProviders;

impl ProviderLoader for BuiltinProviders {
    fn load(&self, provider: &str, args: &[String]) -> Result<Box<dyn BugDatabaseProvider>> {
        match provider {
            JsonFileProvider::NAME => Ok(Box::new(JsonFileProvider::from_args(args)?)),
            other => Err(ChurnError::Config(format!(
                "Unknown bug database provider '{other}' (available: {})",
                JsonFileProvider::NAME
            ))),
        }
    }
}

/// Reads an exported list of work items from a JSON file.
///
/// Items are grouped under their closed date. Items without one land under
/// `fallback_day`, or the day of the export when none is given. Within a day
/// each `(work item, changeset)` pair is kept, so one bug fixed by several
/// changesets marks all of them.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
    fallback_day: Option<NaiveDate>,
}

impl JsonFileProvider {
    pub const NAME: &'static str = "json-file";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_day: None,
        }
    }

    pub fn with_fallback_day(mut self, day: NaiveDate) -> Self {
        self.fallback_day = Some(day);
        self
    }

    fn from_args(args: &[String]) -> Result<Self> {
        let path = args.first().ok_or_else(|| {
            ChurnError::Config(format!("Provider '{}' needs a path argument", Self::NAME))
        })?;
        let mut provider = Self::new(path);
        if let Some(raw) = args.get(1) {
            let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|e| ChurnError::InvalidDate(format!("'{raw}': {e}")))?;
            provider = provider.with_fallback_day(day);
        }
        Ok(provider)
    }
}

impl BugDatabaseProvider for JsonFileProvider {
    fn process(&self) -> Result<Option<WorkItemsByDate>> {
        let content = std::fs::read_to_string(&self.path)?;
        let items: Vec<WorkItem> = serde_json::from_str(&content)?;
        if items.is_empty() {
            return Ok(None);
        }

        let export_day = Utc::now().date_naive();
        let mut by_date = WorkItemsByDate::new();
        for item in items {
            let day = match item.closed_date.map(|d| d.date_naive()).or(self.fallback_day) {
                Some(day) => day,
                None => {
                    tracing::debug!(changeset = %item.changeset_id, "work item has no closed date");
                    export_day
                }
            };
            by_date.entry(day).or_default().insert(item_key(&item), item);
        }
        Ok(Some(by_date))
    }
}

fn item_key(item: &WorkItem) -> String {
    if item.work_item_id.is_empty() {
        item.changeset_id.clone()
    } else {
        format!("{}/{}", item.work_item_id, item.changeset_id)
    }
}
