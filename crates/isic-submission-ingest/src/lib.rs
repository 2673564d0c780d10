use thiserror::Error;

pub mod archive;

// Re-export archive API
pub use archive::{
    EntryInfo, ExtractedPdf, display_name, extract_single_pdf, is_pdf_candidate, list_entries,
    read_chunked, select_candidate,
};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read file data: {0}")]
    Io(#[source] std::io::Error),
    #[error("archive exceeds the size limit of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("failed to open ZIP: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to decompress {name}: {source}")]
    CorruptEntry {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("archive contains no PDF file")]
    NoPdf,
    #[error("archive contains multiple PDF files: {}", names.join(", "))]
    MultiplePdfs { names: Vec<String> },
    #[error("archive contains empty PDF file {name}")]
    EmptyPdf { name: String },
}
