//! Background step: pull the PDF abstract out of the submission ZIP and
//! attach it to the submission.

use isic_submission_core::{
    Config, FileId, FileRecord, Folder, NewUpload, Storage, StorageError, SubmissionId,
};
use isic_submission_ingest::{IngestError, extract_single_pdf, read_chunked};

use crate::{AbstractJob, ChildCount, ProcessError, Rejection};

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// The stored abstract and the link recorded on the submission.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedAbstract {
    pub submission_id: SubmissionId,
    pub folder: Folder,
    pub file: FileRecord,
    pub documentation_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Attached(AttachedAbstract),
    Rejected(Rejection),
}

/// Extract the abstract of an eligible submission and link it as the
/// submission's documentation.
///
/// Every archive problem is checked before the first write, so a rejected
/// job leaves storage as it was. Storage failures are returned as errors.
pub fn save_abstract(
    storage: &dyn Storage,
    config: &Config,
    job: AbstractJob,
) -> Result<ExtractOutcome, ProcessError> {
    let AbstractJob {
        mut submission,
        folder,
        file,
    } = job;

    let reader = storage.open_file(&file)?;
    let data = match read_chunked(reader, config.read_chunk_size, config.max_archive_size) {
        Ok(data) => data,
        Err(IngestError::Io(e)) => return Err(ProcessError::Io(e)),
        Err(e) => return Ok(ExtractOutcome::Rejected(archive_rejection(&file.id, e))),
    };

    let pdf = match extract_single_pdf(&data) {
        Ok(pdf) => pdf,
        Err(e) => return Ok(ExtractOutcome::Rejected(archive_rejection(&file.id, e))),
    };
    drop(data);

    let user = storage
        .load_user(&submission.creator_id)?
        .ok_or_else(|| ProcessError::UserNotFound(submission.creator_id.clone()))?;

    let abstract_folder =
        match storage.create_folder(&folder.id, &config.abstract_folder_name, &user) {
            Ok(created) => created,
            // Another run got there first.
            Err(StorageError::Conflict { .. }) => {
                return Ok(ExtractOutcome::Rejected(Rejection::AbstractExists {
                    folder: folder.id,
                }));
            }
            Err(e) => return Err(e.into()),
        };

    let uploaded = storage.upload_file(
        NewUpload {
            parent: &abstract_folder.id,
            name: &pdf.filename,
            mime_type: PDF_MIME_TYPE,
            size: pdf.data.len() as u64,
            creator: &user,
        },
        &pdf.data,
    )?;

    let documentation_url = config.documentation_url(&uploaded.id);
    submission.documentation_url = Some(documentation_url.clone());
    storage.save_submission(&submission)?;

    Ok(ExtractOutcome::Attached(AttachedAbstract {
        submission_id: submission.id,
        folder: abstract_folder,
        file: uploaded,
        documentation_url,
    }))
}

fn archive_rejection(file: &FileId, error: IngestError) -> Rejection {
    let file = file.clone();
    match error {
        IngestError::TooLarge { limit } => Rejection::ArchiveTooLarge { file, limit },
        IngestError::NoPdf => Rejection::PdfCount {
            file,
            found: ChildCount::None,
        },
        IngestError::MultiplePdfs { names } => {
            tracing::debug!(file = %file, entries = ?names, "ambiguous PDF entries");
            Rejection::PdfCount {
                file,
                found: ChildCount::Several,
            }
        }
        IngestError::EmptyPdf { name } => Rejection::EmptyPdf { file, entry: name },
        other => Rejection::BadArchive {
            file,
            reason: other.to_string(),
        },
    }
}
