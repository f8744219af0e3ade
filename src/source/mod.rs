pub mod git;
pub mod json;

pub use git::GitSource;
pub use json::JsonChangesetSource;

use crate::error::Result;
use crate::model::Changeset;

/// Lists changesets, then decodes them one id at a time.
pub trait ChangesetSource {
    fn changeset_ids(&mut self) -> Result<Vec<String>>;

    fn describe(&mut self, id: &str) -> Result<Changeset>;
}
