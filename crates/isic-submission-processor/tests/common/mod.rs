//! Shared fixtures: a platform with one user, one phase, and one submission
//! whose folder the tests populate.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex, PoisonError};

use isic_submission_core::{
    FileRecord, Folder, MemoryStorage, Phase, PhaseId, Submission, SubmissionId, User, UserId,
};

pub const CREATOR: &str = "5a0c1f2e3d4b5a6978695a4b";

pub struct Fixture {
    pub storage: Arc<MemoryStorage>,
    pub submission: Submission,
    pub folder: Folder,
}

impl Fixture {
    /// A submission to a phase tagged `isic2018: <tag>` (untagged when `None`).
    pub fn new(phase_tag: Option<&str>) -> Self {
        Self::with_id("sub-1", phase_tag)
    }

    pub fn with_id(id: &str, phase_tag: Option<&str>) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        Self::in_storage(storage, id, phase_tag)
    }

    /// Add another submission to an existing storage.
    pub fn in_storage(storage: Arc<MemoryStorage>, id: &str, phase_tag: Option<&str>) -> Self {
        storage.insert_user(User {
            id: UserId::from(CREATOR),
            login: "participant".into(),
            extra: Default::default(),
        });

        let phase_id = PhaseId::new(format!("phase-{id}"));
        let mut meta = serde_json::Map::new();
        if let Some(tag) = phase_tag {
            meta.insert("isic2018".into(), tag.into());
        }
        storage.insert_phase(Phase {
            id: phase_id.clone(),
            name: "ISIC 2018: Lesion Segmentation (Final Test)".into(),
            meta,
            extra: Default::default(),
        });

        let folder = storage.add_folder(&format!("submission {id}"), None);
        let submission = Submission {
            id: SubmissionId::from(id),
            phase_id,
            folder_id: folder.id.clone(),
            creator_id: UserId::from(CREATOR),
            documentation_url: None,
            extra: Default::default(),
        };
        storage.insert_submission(submission.clone());

        Self {
            storage,
            submission,
            folder,
        }
    }

    /// Put a single submission ZIP with these entries in the folder.
    pub fn upload_zip(&self, entries: &[(&str, &str)]) -> FileRecord {
        self.upload_raw(build_zip(entries))
    }

    /// Put a single file with arbitrary bytes in the folder.
    pub fn upload_raw(&self, data: Vec<u8>) -> FileRecord {
        let item = self.storage.add_item(&self.folder.id, "submission.zip");
        self.storage
            .add_file(&item.id, "submission.zip", Some("application/zip"), data)
    }

    pub fn abstract_folders(&self) -> Vec<Folder> {
        self.storage
            .child_folders(&self.folder.id)
            .into_iter()
            .filter(|f| f.name == "Abstract")
            .collect()
    }
}

/// Build a ZIP in memory. Names ending in `/` become directory entries.
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Formatted log output collected from a scoped subscriber.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Subscriber writing plain-text lines into this capture. Install it with
    /// `tracing::subscriber::set_default` on the thread that drives the test.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }

    /// Captured lines logged at `level` (`"WARN"`, `"INFO"`, ...).
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|line| line.trim_start().starts_with(level))
            .map(str::to_string)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
