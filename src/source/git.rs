use super::ChangesetSource;
use crate::cache::ChangesetCache;
use crate::error::{ChurnError, Result};
use crate::model::{Changeset, DateRange, FileDelta};
use crate::util::parse_timestamp;
use chrono::{DateTime, Utc};
use gix::object::tree::diff::ChangeDetached;
use gix::{discover, ObjectId, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use similar::{DiffOp, TextDiff};
use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Changesets read straight from a git repository.
pub struct GitSource {
    repo: Repository,
    path: PathBuf,
    range: DateRange,
    include_merges: bool,
    binary: bool,
    cache: Option<ChangesetCache>,
}

impl GitSource {
    /// Open a repository at `path`, or current dir if `None`
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let repo_path = match path {
            Some(p) => p.as_ref().to_path_buf(),
            None => std::env::current_dir()?,
        };

        let repo = discover(&repo_path)?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();

        Ok(Self {
            repo,
            path,
            range: DateRange::new(),
            include_merges: false,
            binary: false,
            cache: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn include_merges(mut self, include: bool) -> Self {
        self.include_merges = include;
        self
    }

    pub fn include_binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    pub fn with_cache(mut self, cache: ChangesetCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn resolve_range(&self, since: Option<&str>, until: Option<&str>) -> Result<DateRange> {
        let since_dt = since.map(|s| self.parse_commit_or_date(s)).transpose()?;
        let until_dt = until.map(|u| self.parse_commit_or_date(u)).transpose()?;

        if let (Some(s), Some(u)) = (since_dt, until_dt) {
            if s > u {
                return Err(ChurnError::InvalidDate(format!(
                    "Invalid range: since ({s}) is after until ({u})"
                )));
            }
        }

        let mut range = DateRange::new();
        if let Some(s) = since_dt {
            range = range.with_since(s);
        }
        if let Some(u) = until_dt {
            range = range.with_until(u);
        }
        Ok(range)
    }

    fn parse_commit_or_date(&self, input: &str) -> Result<DateTime<Utc>> {
        if let Ok(dt) = parse_timestamp(input) {
            return Ok(dt);
        }

        // Fallback to Git ref
        let id = self
            .repo
            .rev_parse_single(input)
            .map_err(|e| ChurnError::Parse(format!("Invalid commit or date '{input}': {e}")))?;

        let commit = id
            .object()?
            .try_into_commit()
            .map_err(|_| ChurnError::Parse(format!("Not a commit: {input}")))?;

        let secs = commit.time()?.seconds;
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| ChurnError::InvalidDate(format!("Invalid timestamp: {secs}")))
    }

    fn decode(&self, id: &str) -> Result<Changeset> {
        let oid = ObjectId::from_hex(id.as_bytes())
            .map_err(|e| ChurnError::decode(id, format!("invalid commit id: {e}")))?;
        let commit = self.repo.find_commit(oid)?;
        let secs = commit.time()?.seconds;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| ChurnError::InvalidDate(format!("Invalid timestamp: {secs}")))?;
        let author = commit.author()?.name.to_string();

        let commit_tree = commit.tree()?;
        let parent_tree = match commit.parent_ids().next() {
            Some(parent_id) => Some(self.repo.find_commit(parent_id.detach())?.tree()?),
            None => None,
        };

        let changes: Vec<ChangeDetached> =
            self.repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), None)?;

        let mut file_deltas = Vec::new();
        for change in changes {
            self.handle_change(change, &mut file_deltas)?;
        }
        tracing::debug!(changeset = id, files = file_deltas.len(), "decoded changeset");

        Ok(Changeset {
            id: id.to_string(),
            author,
            timestamp,
            file_deltas,
        })
    }

    fn handle_change(&self, change: ChangeDetached, files: &mut Vec<FileDelta>) -> Result<()> {
        match change {
            ChangeDetached::Addition { id, location, .. } => {
                let obj = self.repo.find_object(id)?;
                if let Some(text) = self.text_of(&obj) {
                    let mut delta = FileDelta::new(location.to_string());
                    delta.added = text.lines().count() as u64;
                    files.push(delta);
                }
            }
            ChangeDetached::Deletion { id, location, .. } => {
                let obj = self.repo.find_object(id)?;
                if let Some(text) = self.text_of(&obj) {
                    let mut delta = FileDelta::new(location.to_string());
                    delta.deleted = text.lines().count() as u64;
                    files.push(delta);
                }
            }
            ChangeDetached::Modification {
                previous_id,
                id,
                location,
                ..
            } => {
                let old_obj = self.repo.find_object(previous_id)?;
                let new_obj = self.repo.find_object(id)?;
                if let (Some(old), Some(new)) = (self.text_of(&old_obj), self.text_of(&new_obj)) {
                    files.push(line_delta(&location.to_string(), &old, &new));
                }
            }
            ChangeDetached::Rewrite {
                source_id,
                id,
                source_location,
                location,
                copy,
                ..
            } => {
                let old_obj = self.repo.find_object(source_id)?;
                let new_obj = self.repo.find_object(id)?;
                if let (Some(old), Some(new)) = (self.text_of(&old_obj), self.text_of(&new_obj)) {
                    let target = location.to_string();
                    if copy {
                        let mut delta = FileDelta::new(target);
                        delta.added = new.lines().count() as u64;
                        files.push(delta);
                    } else {
                        // renames keep their history on the new path
                        tracing::debug!(from = %source_location, to = %target, "rename");
                        files.push(line_delta(&target, &old, &new));
                    }
                }
            }
        }
        Ok(())
    }

    /// `None` for binary blobs unless binary files were requested, in which
    /// case they count as a change without lines. Text that is not valid
    /// UTF-8 is read lossily.
    fn text_of<'a>(&self, object: &'a gix::Object<'_>) -> Option<Cow<'a, str>> {
        let data = object.data.as_slice();
        let is_binary = data.iter().take(8192).any(|&b| b == 0);
        if is_binary {
            return self.binary.then_some(Cow::Borrowed(""));
        }
        Some(String::from_utf8_lossy(data))
    }
}

impl ChangesetSource for GitSource {
    fn changeset_ids(&mut self) -> Result<Vec<String>> {
        let mut head = self.repo.head()?;
        let head_commit = head.peel_to_commit_in_place()?;

        let mut ids = Vec::new();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut stack: VecDeque<ObjectId> = VecDeque::from([head_commit.id]);

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Listing changesets...");

        while let Some(commit_id) = stack.pop_back() {
            if !seen.insert(commit_id) {
                continue;
            }

            let commit = self.repo.find_commit(commit_id)?;
            let secs = commit.time()?.seconds;
            let timestamp = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| ChurnError::InvalidDate(format!("Invalid timestamp: {secs}")))?;
            let parents: Vec<ObjectId> = commit.parent_ids().map(|id| id.detach()).collect();

            let is_merge = parents.len() > 1;
            if self.range.contains(&timestamp) && (self.include_merges || !is_merge) {
                ids.push(commit_id.to_string());
                pb.inc(1);
            }
            stack.extend(parents);
        }

        pb.finish_and_clear();
        tracing::info!(count = ids.len(), repo = %self.path.display(), "listed changesets");
        Ok(ids)
    }

    fn describe(&mut self, id: &str) -> Result<Changeset> {
        if let Some(cache) = &self.cache {
            if let Some(changeset) = cache.get_changeset(id, self.binary)? {
                return Ok(changeset);
            }
        }

        let changeset = self.decode(id)?;
        if let Some(cache) = self.cache.as_mut() {
            cache.store_changeset(&changeset, self.binary)?;
        }
        Ok(changeset)
    }
}

/// Line statistics between two versions of a file: pure insertions count as
/// added, pure removals as deleted, and replaced hunks as changed lines
/// before and after.
pub(crate) fn line_delta(path: &str, old: &str, new: &str) -> FileDelta {
    let mut delta = FileDelta::new(path);
    let diff = TextDiff::from_lines(old, new);
    for op in diff.ops() {
        match *op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete { old_len, .. } => delta.deleted += old_len as u64,
            DiffOp::Insert { new_len, .. } => delta.added += new_len as u64,
            DiffOp::Replace { old_len, new_len, .. } => {
                delta.before_lines += old_len as u64;
                delta.after_lines += new_len as u64;
            }
        }
    }
    delta
}
