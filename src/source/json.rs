use super::ChangesetSource;
use crate::error::{ChurnError, Result};
use crate::model::Changeset;
use std::collections::HashMap;
use std::path::Path;

/// Changesets that were decoded elsewhere and saved as a JSON array.
#[derive(Debug, Clone, Default)]
pub struct JsonChangesetSource {
    order: Vec<String>,
    changesets: HashMap<String, Changeset>,
}

impl JsonChangesetSource {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let changesets: Vec<Changeset> = serde_json::from_str(&content)?;
        Ok(Self::from_changesets(changesets))
    }

    pub fn from_changesets(changesets: Vec<Changeset>) -> Self {
        let mut source = Self::default();
        for changeset in changesets {
            if !source.changesets.contains_key(&changeset.id) {
                source.order.push(changeset.id.clone());
            }
            source.changesets.insert(changeset.id.clone(), changeset);
        }
        source
    }
}

impl ChangesetSource for JsonChangesetSource {
    fn changeset_ids(&mut self) -> Result<Vec<String>> {
        Ok(self.order.clone())
    }

    fn describe(&mut self, id: &str) -> Result<Changeset> {
        self.changesets
            .get(id)
            .cloned()
            .ok_or_else(|| ChurnError::decode(id, "not present in changeset file"))
    }
}
