use std::fmt;

use serde::{Deserialize, Serialize};

pub mod config_file;
pub mod memory;
pub mod storage;

// Re-export for convenience
pub use config_file::ConfigFile;
pub use memory::{MemoryStorage, Snapshot};
pub use storage::{NewUpload, Storage, StorageError};

/// Declares a string-backed document id.
macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

document_id!(
    /// Id of a challenge submission.
    SubmissionId
);
document_id!(
    /// Id of a challenge phase.
    PhaseId
);
document_id!(FolderId);
document_id!(ItemId);
document_id!(FileId);
document_id!(UserId);

/// JSON object holding document fields without a typed counterpart.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// A scored (or scoring) challenge submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(rename = "_id")]
    pub id: SubmissionId,
    pub phase_id: PhaseId,
    /// Folder holding the uploaded submission archive.
    pub folder_id: FolderId,
    pub creator_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    /// Fields of the platform document not modelled here, kept verbatim.
    #[serde(flatten)]
    pub extra: Extra,
}

/// A challenge phase. `meta` carries free-form tags set by challenge admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    #[serde(rename = "_id")]
    pub id: PhaseId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub meta: Extra,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Phase {
    /// String value of a `meta` tag, if present and a string.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    #[serde(rename = "_id")]
    pub id: FolderId,
    pub name: String,
    /// `None` for root folders.
    #[serde(default)]
    pub parent_id: Option<FolderId>,
    #[serde(default)]
    pub creator_id: Option<UserId>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub name: String,
    pub folder_id: FolderId,
    #[serde(default)]
    pub creator_id: Option<UserId>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Metadata of a stored file. The bytes live in the storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "_id")]
    pub id: FileId,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size: u64,
    pub item_id: ItemId,
    #[serde(default)]
    pub creator_id: Option<UserId>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub login: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Size of each read when buffering a stored file into memory.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4 * 1024 * 1024;

pub const DEFAULT_API_BASE_URL: &str = "https://challenge.kitware.com";

/// Runtime configuration for submission post-processing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Phase `meta` key that tags the competition track.
    pub phase_meta_key: String,
    /// Value of `phase_meta_key` that makes a phase eligible.
    pub phase_meta_value: String,
    /// Name of the subfolder the extracted abstract is stored in.
    pub abstract_folder_name: String,
    pub read_chunk_size: usize,
    /// Upper bound on the archive size in bytes. 0 means unlimited.
    pub max_archive_size: u64,
    /// Public base URL of the platform API, used to build documentation links.
    pub api_base_url: String,
    pub num_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            phase_meta_key: "isic2018".to_string(),
            phase_meta_value: "final".to_string(),
            abstract_folder_name: "Abstract".to_string(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_archive_size: 0,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            num_workers: 2,
        }
    }
}

impl Config {
    /// Build a runtime config from an on-disk config, falling back to defaults
    /// for anything unset. Zero chunk sizes and zero worker counts are ignored.
    pub fn from_file(file: &ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(phase) = &file.phase {
            if let Some(key) = &phase.meta_key {
                config.phase_meta_key = key.clone();
            }
            if let Some(value) = &phase.meta_value {
                config.phase_meta_value = value.clone();
            }
        }
        if let Some(extraction) = &file.extraction {
            if let Some(name) = &extraction.abstract_folder_name {
                config.abstract_folder_name = name.clone();
            }
            if let Some(size) = extraction.read_chunk_size
                && size > 0
            {
                config.read_chunk_size = size;
            }
            if let Some(mb) = extraction.max_archive_size_mb {
                config.max_archive_size = mb.saturating_mul(1024 * 1024);
            }
        }
        if let Some(url) = file.links.as_ref().and_then(|l| l.api_base_url.clone()) {
            config.api_base_url = url;
        }
        if let Some(n) = file.workers.as_ref().and_then(|w| w.num_workers)
            && n > 0
        {
            config.num_workers = n;
        }

        config
    }

    /// Inline-download link for a stored file.
    pub fn documentation_url(&self, file_id: &FileId) -> String {
        format!(
            "{}/api/v1/file/{}/download?contentDisposition=inline",
            self.api_base_url.trim_end_matches('/'),
            file_id
        )
    }

    /// Whether a phase belongs to the track this processor handles.
    pub fn applies_to(&self, phase: &Phase) -> bool {
        phase.meta_str(&self.phase_meta_key) == Some(self.phase_meta_value.as_str())
    }
}
