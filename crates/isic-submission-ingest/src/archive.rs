use std::io::{Cursor, ErrorKind, Read};

use crate::IngestError;

/// Path prefix of the resource-fork entries macOS adds to ZIP files.
const MACOS_METADATA_PREFIX: &str = "__MACOSX";

/// The single PDF pulled out of a submission archive.
#[derive(Debug, Clone)]
pub struct ExtractedPdf {
    /// Full entry name inside the archive.
    pub entry_name: String,
    /// Entry name without its directory prefix.
    pub filename: String,
    pub data: Vec<u8>,
}

/// Central-directory information about one archive entry.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
}

impl EntryInfo {
    pub fn is_candidate(&self) -> bool {
        !self.is_dir && is_pdf_candidate(&self.name)
    }
}

/// Returns true if an archive entry name is a regular PDF.
/// Entries under the macOS metadata prefix never count, whatever their extension.
pub fn is_pdf_candidate(name: &str) -> bool {
    if name.starts_with(MACOS_METADATA_PREFIX) {
        return false;
    }
    name.to_lowercase().ends_with(".pdf")
}

/// Final path segment of an archive entry name.
pub fn display_name(entry_name: &str) -> &str {
    match entry_name.rfind('/') {
        Some(pos) => &entry_name[pos + 1..],
        None => entry_name,
    }
}

/// Buffer a whole stream in memory, reading `chunk_size` bytes at a time.
/// `max_size` limits the total bytes read (0 = unlimited).
pub fn read_chunked<R: Read>(
    mut reader: R,
    chunk_size: usize,
    max_size: u64,
) -> Result<Vec<u8>, IngestError> {
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(IngestError::Io(e)),
        };
        buffer.extend_from_slice(&chunk[..n]);

        if max_size > 0 && buffer.len() as u64 > max_size {
            return Err(IngestError::TooLarge { limit: max_size });
        }
    }

    Ok(buffer)
}

/// List every entry of a ZIP archive held in memory, in central-directory order.
pub fn list_entries(data: &[u8]) -> Result<Vec<EntryInfo>, IngestError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    entries_of(&mut archive)
}

fn entries_of<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<EntryInfo>, IngestError> {
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        // Raw access reads only the header, so encrypted entries still list.
        let file = archive.by_index_raw(i)?;
        entries.push(EntryInfo {
            index: i,
            name: file.name().to_string(),
            size: file.size(),
            compressed_size: file.compressed_size(),
            is_dir: file.is_dir(),
        });
    }
    Ok(entries)
}

/// Pick the one PDF candidate out of an entry list.
pub fn select_candidate(entries: &[EntryInfo]) -> Result<&EntryInfo, IngestError> {
    let candidates: Vec<&EntryInfo> = entries.iter().filter(|e| e.is_candidate()).collect();
    match candidates.as_slice() {
        [only] => Ok(only),
        [] => Err(IngestError::NoPdf),
        many => Err(IngestError::MultiplePdfs {
            names: many.iter().map(|e| e.name.clone()).collect(),
        }),
    }
}

/// Extract the single PDF from a ZIP archive held in memory.
///
/// Fails when the data is not a ZIP, when the archive holds zero or several
/// PDF candidates, or when the PDF decompresses to nothing.
pub fn extract_single_pdf(data: &[u8]) -> Result<ExtractedPdf, IngestError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let entries = entries_of(&mut archive)?;
    let candidate = select_candidate(&entries)?;
    let entry_name = candidate.name.clone();

    let mut file = archive.by_index(candidate.index)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|source| IngestError::CorruptEntry {
            name: entry_name.clone(),
            source,
        })?;

    if buf.is_empty() {
        return Err(IngestError::EmptyPdf { name: entry_name });
    }

    tracing::debug!(entry = %entry_name, bytes = buf.len(), "extracted PDF from archive");

    Ok(ExtractedPdf {
        filename: display_name(&entry_name).to_string(),
        entry_name,
        data: buf,
    })
}
