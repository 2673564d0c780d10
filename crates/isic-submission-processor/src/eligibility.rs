//! Synchronous checks run right after a submission is scored.
//!
//! Everything here is read-only. A submission is eligible when its phase is
//! tagged for abstract collection, its folder holds exactly one item with
//! exactly one file, and no abstract folder exists yet.

use isic_submission_core::{Config, Storage, SubmissionId};

use crate::{AbstractJob, ChildCount, ProcessError, Rejection};

/// Children fetched when checking for "exactly one": enough to tell one from many.
const CARDINALITY_PROBE: usize = 2;

#[derive(Debug, Clone)]
pub enum Eligibility {
    /// The phase is not one abstracts are collected for.
    NotApplicable,
    Rejected(Rejection),
    Eligible(AbstractJob),
}

/// Decide whether a scored submission should have its abstract extracted.
pub fn check_submission(
    storage: &dyn Storage,
    config: &Config,
    submission_id: &SubmissionId,
) -> Result<Eligibility, ProcessError> {
    let submission = storage
        .load_submission(submission_id)?
        .ok_or_else(|| ProcessError::SubmissionNotFound(submission_id.clone()))?;
    let phase = storage
        .load_phase(&submission.phase_id)?
        .ok_or_else(|| ProcessError::PhaseNotFound(submission.phase_id.clone()))?;

    if !config.applies_to(&phase) {
        return Ok(Eligibility::NotApplicable);
    }

    let Some(folder) = storage.load_folder(&submission.folder_id)? else {
        return Ok(Eligibility::Rejected(Rejection::FolderMissing {
            folder: submission.folder_id.clone(),
        }));
    };

    let item = match <[_; 1]>::try_from(storage.child_items(&folder.id, CARDINALITY_PROBE)?) {
        Ok([item]) => item,
        Err(items) => {
            return Ok(Eligibility::Rejected(Rejection::ItemCount {
                folder: folder.id.clone(),
                found: ChildCount::from_len(items.len()),
            }));
        }
    };

    let file = match <[_; 1]>::try_from(storage.child_files(&item.id, CARDINALITY_PROBE)?) {
        Ok([file]) => file,
        Err(files) => {
            return Ok(Eligibility::Rejected(Rejection::FileCount {
                item: item.id.clone(),
                found: ChildCount::from_len(files.len()),
            }));
        }
    };

    // Best-effort guard against processing twice; creation itself also
    // refuses duplicate names.
    if storage
        .find_child_folder(&folder.id, &config.abstract_folder_name)?
        .is_some()
    {
        return Ok(Eligibility::Rejected(Rejection::AbstractExists {
            folder: folder.id.clone(),
        }));
    }

    Ok(Eligibility::Eligible(AbstractJob {
        submission,
        folder,
        file,
    }))
}
