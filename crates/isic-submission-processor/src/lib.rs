//! Post-scoring processing of challenge submissions.
//!
//! When a submission to a final test phase has been scored, its uploaded ZIP
//! is expected to carry a short PDF abstract describing the approach. The
//! [`ScoreHook`] checks the submission synchronously (see [`eligibility`]) and
//! hands eligible ones to the [`AbstractPool`], which extracts the PDF into an
//! `Abstract` subfolder and links it from the submission (see [`extract`]).

use std::fmt;

use isic_submission_core::{
    FileId, FileRecord, Folder, FolderId, ItemId, PhaseId, StorageError, Submission, SubmissionId,
    UserId,
};
use thiserror::Error;

pub mod eligibility;
pub mod extract;
pub mod hook;
pub mod pool;

// Re-export for convenience
pub use eligibility::{Eligibility, check_submission};
pub use extract::{AttachedAbstract, ExtractOutcome, PDF_MIME_TYPE, save_abstract};
pub use hook::{Dispatch, ListenStats, ScoreHook, SubmissionScored};
pub use pool::{AbstractPool, JobEvent, JobObserver};

/// Everything the background extraction needs, gathered by the eligibility check.
#[derive(Debug, Clone)]
pub struct AbstractJob {
    pub submission: Submission,
    pub folder: Folder,
    /// The submission ZIP.
    pub file: FileRecord,
}

/// How a child count missed "exactly one".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildCount {
    None,
    Several,
}

impl ChildCount {
    pub(crate) fn from_len(len: usize) -> Self {
        if len == 0 {
            ChildCount::None
        } else {
            ChildCount::Several
        }
    }
}

impl fmt::Display for ChildCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildCount::None => f.write_str("none"),
            ChildCount::Several => f.write_str("more than one"),
        }
    }
}

/// A submission that can't be processed automatically. Rejections are logged
/// as warnings for a curator and leave storage untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("failed to load submission folder (FolderId={folder})")]
    FolderMissing { folder: FolderId },
    #[error("expected exactly one item in submission folder, found {found} (FolderId={folder})")]
    ItemCount { folder: FolderId, found: ChildCount },
    #[error("expected exactly one file in submission item, found {found} (ItemId={item})")]
    FileCount { item: ItemId, found: ChildCount },
    #[error("abstract folder already exists in submission folder (FolderId={folder})")]
    AbstractExists { folder: FolderId },
    #[error("submission ZIP file exceeds {limit} bytes (FileId={file})")]
    ArchiveTooLarge { file: FileId, limit: u64 },
    #[error("failed to process submission ZIP file: {reason} (FileId={file})")]
    BadArchive { file: FileId, reason: String },
    #[error("expected exactly one PDF file in submission ZIP file, found {found} (FileId={file})")]
    PdfCount { file: FileId, found: ChildCount },
    #[error("submission ZIP file contains empty PDF file {entry} (FileId={file})")]
    EmptyPdf { file: FileId, entry: String },
}

/// Unexpected failures. These are not curator-actionable and are logged as
/// errors by whoever drives the processing.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to read submission file: {0}")]
    Io(#[source] std::io::Error),
    #[error("submission not found: {0}")]
    SubmissionNotFound(SubmissionId),
    #[error("phase not found: {0}")]
    PhaseNotFound(PhaseId),
    #[error("submission creator not found: {0}")]
    UserNotFound(UserId),
}
