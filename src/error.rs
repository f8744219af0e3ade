use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChurnError>;

#[derive(Error, Debug)]
pub enum ChurnError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Failed to decode changeset {id}: {reason}")]
    Decode { id: String, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Dll specified without known output file")]
    BugDatabaseWithoutOutput,
    #[error("Object find error: {0}")]
    ObjectFind(#[from] Box<gix::object::find::existing::Error>),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Reference find error: {0}")]
    RefFind(#[from] Box<gix::reference::find::existing::Error>),
    #[error("Head peel error: {0}")]
    HeadPeel(#[from] Box<gix::head::peel::to_commit::Error>),
    #[error("Object find with conversion error: {0}")]
    ObjectFindConv(#[from] Box<gix::object::find::existing::with_conversion::Error>),
    #[error("Object decode error: {0}")]
    ObjectDecode(#[from] Box<gix::objs::decode::Error>),
    #[error("Diff tree to tree error: {0}")]
    DiffTreeToTree(#[from] Box<gix::repository::diff_tree_to_tree::Error>),
    #[error("Git discover error: {0}")]
    GitDiscover(#[from] Box<gix::discover::Error>),
}

impl ChurnError {
    pub fn decode(id: impl Into<String>, reason: impl Into<String>) -> Self {
        ChurnError::Decode {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

// gix errors are large; box them on the way in
impl From<gix::object::find::existing::Error> for ChurnError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        ChurnError::ObjectFind(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for ChurnError {
    fn from(err: gix::object::commit::Error) -> Self {
        ChurnError::Commit(Box::new(err))
    }
}

impl From<gix::reference::find::existing::Error> for ChurnError {
    fn from(err: gix::reference::find::existing::Error) -> Self {
        ChurnError::RefFind(Box::new(err))
    }
}

impl From<gix::head::peel::to_commit::Error> for ChurnError {
    fn from(err: gix::head::peel::to_commit::Error) -> Self {
        ChurnError::HeadPeel(Box::new(err))
    }
}

impl From<gix::object::find::existing::with_conversion::Error> for ChurnError {
    fn from(err: gix::object::find::existing::with_conversion::Error) -> Self {
        ChurnError::ObjectFindConv(Box::new(err))
    }
}

impl From<gix::objs::decode::Error> for ChurnError {
    fn from(err: gix::objs::decode::Error) -> Self {
        ChurnError::ObjectDecode(Box::new(err))
    }
}

impl From<gix::repository::diff_tree_to_tree::Error> for ChurnError {
    fn from(err: gix::repository::diff_tree_to_tree::Error) -> Self {
        ChurnError::DiffTreeToTree(Box::new(err))
    }
}

impl From<gix::discover::Error> for ChurnError {
    fn from(err: gix::discover::Error) -> Self {
        ChurnError::GitDiscover(Box::new(err))
    }
}
