//! The storage surface the submission processor talks to.
//!
//! Everything the processor reads or writes goes through [`Storage`]. Loads are
//! privileged: they bypass per-user access control, since processing runs in
//! the background without a request-scoped identity.

use std::io::Read;

use thiserror::Error;

use crate::{
    FileRecord, Folder, FolderId, Item, ItemId, Phase, PhaseId, Submission, SubmissionId, User,
    UserId,
};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("folder {parent} already contains a child folder named {name:?}")]
    Conflict { parent: FolderId, name: String },
    #[error("upload declared {declared} bytes but {actual} were supplied")]
    SizeMismatch { declared: u64, actual: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Other(String),
}

/// A file to be created inside a folder.
#[derive(Debug, Clone)]
pub struct NewUpload<'a> {
    pub parent: &'a FolderId,
    pub name: &'a str,
    pub mime_type: &'a str,
    /// Declared size; must match the supplied bytes.
    pub size: u64,
    pub creator: &'a User,
}

/// Document and blob storage of the host platform.
pub trait Storage: Send + Sync {
    fn load_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StorageError>;

    fn load_phase(&self, id: &PhaseId) -> Result<Option<Phase>, StorageError>;

    fn load_folder(&self, id: &FolderId) -> Result<Option<Folder>, StorageError>;

    fn load_user(&self, id: &UserId) -> Result<Option<User>, StorageError>;

    /// Immediate child items of a folder, at most `limit` of them.
    fn child_items(&self, folder: &FolderId, limit: usize) -> Result<Vec<Item>, StorageError>;

    /// Files of an item, at most `limit` of them.
    fn child_files(&self, item: &ItemId, limit: usize) -> Result<Vec<FileRecord>, StorageError>;

    /// Child folder of `parent` with exactly this name.
    fn find_child_folder(&self, parent: &FolderId, name: &str)
    -> Result<Option<Folder>, StorageError>;

    /// Create a child folder. Fails with [`StorageError::Conflict`] when a
    /// sibling folder with the same name exists.
    fn create_folder(
        &self,
        parent: &FolderId,
        name: &str,
        creator: &User,
    ) -> Result<Folder, StorageError>;

    /// Open a stored file for reading.
    fn open_file(&self, file: &FileRecord) -> Result<Box<dyn Read + Send>, StorageError>;

    /// Store `data` as a new file in a folder.
    fn upload_file(&self, upload: NewUpload<'_>, data: &[u8]) -> Result<FileRecord, StorageError>;

    /// Persist a submission record.
    fn save_submission(&self, submission: &Submission) -> Result<(), StorageError>;
}
