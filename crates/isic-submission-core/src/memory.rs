//! In-memory [`Storage`] backend.
//!
//! Used by the CLI (seeded from a JSON snapshot of platform records) and by
//! tests. Folder names are unique per parent, so a second `create_folder`
//! with the same name fails with [`StorageError::Conflict`].

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::storage::{NewUpload, Storage, StorageError};
use crate::{
    FileId, FileRecord, Folder, FolderId, Item, ItemId, Phase, PhaseId, Submission, SubmissionId,
    User, UserId,
};

/// Serializable copy of every record held by a [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub files: Vec<SnapshotFile>,
}

/// A file record together with its bytes (base64 in JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(flatten)]
    pub record: FileRecord,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

struct StoredFile {
    record: FileRecord,
    data: Arc<[u8]>,
}

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, User>,
    phases: BTreeMap<PhaseId, Phase>,
    submissions: BTreeMap<SubmissionId, Submission>,
    folders: BTreeMap<FolderId, Folder>,
    items: BTreeMap<ItemId, Item>,
    files: BTreeMap<FileId, StoredFile>,
}

impl State {
    fn id_in_use(&self, id: &str) -> bool {
        self.users.contains_key(&UserId::from(id))
            || self.phases.contains_key(&PhaseId::from(id))
            || self.submissions.contains_key(&SubmissionId::from(id))
            || self.folders.contains_key(&FolderId::from(id))
            || self.items.contains_key(&ItemId::from(id))
            || self.files.contains_key(&FileId::from(id))
    }
}

/// Thread-safe in-memory platform storage.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    next_id: AtomicU64,
    mutations: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a storage pre-populated from a snapshot. File sizes are taken
    /// from the snapshot bytes.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let storage = Self::new();
        {
            let mut state = storage.lock();
            for user in snapshot.users {
                state.users.insert(user.id.clone(), user);
            }
            for phase in snapshot.phases {
                state.phases.insert(phase.id.clone(), phase);
            }
            for submission in snapshot.submissions {
                state.submissions.insert(submission.id.clone(), submission);
            }
            for folder in snapshot.folders {
                state.folders.insert(folder.id.clone(), folder);
            }
            for item in snapshot.items {
                state.items.insert(item.id.clone(), item);
            }
            for file in snapshot.files {
                let mut record = file.record;
                record.size = file.data.len() as u64;
                state.files.insert(
                    record.id.clone(),
                    StoredFile {
                        record,
                        data: file.data.into(),
                    },
                );
            }
        }
        storage
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            users: state.users.values().cloned().collect(),
            phases: state.phases.values().cloned().collect(),
            submissions: state.submissions.values().cloned().collect(),
            folders: state.folders.values().cloned().collect(),
            items: state.items.values().cloned().collect(),
            files: state
                .files
                .values()
                .map(|f| SnapshotFile {
                    record: f.record.clone(),
                    data: f.data.to_vec(),
                })
                .collect(),
        }
    }

    /// Load a JSON snapshot from disk.
    pub fn load_json(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current state to disk as pretty-printed JSON.
    pub fn save_json(&self, path: &Path) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Number of mutating [`Storage`] calls that succeeded so far.
    /// Seeding through the `insert_*`/`add_*` helpers is not counted.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id.clone(), user);
    }

    pub fn insert_phase(&self, phase: Phase) {
        self.lock().phases.insert(phase.id.clone(), phase);
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.lock()
            .submissions
            .insert(submission.id.clone(), submission);
    }

    pub fn insert_folder(&self, folder: Folder) {
        self.lock().folders.insert(folder.id.clone(), folder);
    }

    pub fn insert_item(&self, item: Item) {
        self.lock().items.insert(item.id.clone(), item);
    }

    /// Add a folder with a generated id.
    pub fn add_folder(&self, name: &str, parent: Option<&FolderId>) -> Folder {
        let mut state = self.lock();
        let folder = Folder {
            id: FolderId(self.fresh_id(&state)),
            name: name.to_string(),
            parent_id: parent.cloned(),
            creator_id: None,
            extra: Default::default(),
        };
        state.folders.insert(folder.id.clone(), folder.clone());
        folder
    }

    /// Add an item with a generated id.
    pub fn add_item(&self, folder: &FolderId, name: &str) -> Item {
        let mut state = self.lock();
        let item = Item {
            id: ItemId(self.fresh_id(&state)),
            name: name.to_string(),
            folder_id: folder.clone(),
            creator_id: None,
            extra: Default::default(),
        };
        state.items.insert(item.id.clone(), item.clone());
        item
    }

    /// Add a file with a generated id to an item.
    pub fn add_file(
        &self,
        item: &ItemId,
        name: &str,
        mime_type: Option<&str>,
        data: Vec<u8>,
    ) -> FileRecord {
        let mut state = self.lock();
        let record = FileRecord {
            id: FileId(self.fresh_id(&state)),
            name: name.to_string(),
            mime_type: mime_type.map(str::to_string),
            size: data.len() as u64,
            item_id: item.clone(),
            creator_id: None,
            extra: Default::default(),
        };
        state.files.insert(
            record.id.clone(),
            StoredFile {
                record: record.clone(),
                data: data.into(),
            },
        );
        record
    }

    /// All child folders of `parent`.
    pub fn child_folders(&self, parent: &FolderId) -> Vec<Folder> {
        self.lock()
            .folders
            .values()
            .filter(|f| f.parent_id.as_ref() == Some(parent))
            .cloned()
            .collect()
    }

    /// Files stored anywhere under `folder`'s items.
    pub fn files_in_folder(&self, folder: &FolderId) -> Vec<FileRecord> {
        let state = self.lock();
        state
            .files
            .values()
            .filter(|f| {
                state
                    .items
                    .get(&f.record.item_id)
                    .is_some_and(|item| &item.folder_id == folder)
            })
            .map(|f| f.record.clone())
            .collect()
    }

    pub fn file_data(&self, id: &FileId) -> Option<Vec<u8>> {
        self.lock().files.get(id).map(|f| f.data.to_vec())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// ObjectId-style 24 hex digit id not used by any record.
    fn fresh_id(&self, state: &State) -> String {
        loop {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("{n:024x}");
            if !state.id_in_use(&id) {
                return id;
            }
        }
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl Storage for MemoryStorage {
    fn load_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StorageError> {
        Ok(self.lock().submissions.get(id).cloned())
    }

    fn load_phase(&self, id: &PhaseId) -> Result<Option<Phase>, StorageError> {
        Ok(self.lock().phases.get(id).cloned())
    }

    fn load_folder(&self, id: &FolderId) -> Result<Option<Folder>, StorageError> {
        Ok(self.lock().folders.get(id).cloned())
    }

    fn load_user(&self, id: &UserId) -> Result<Option<User>, StorageError> {
        Ok(self.lock().users.get(id).cloned())
    }

    fn child_items(&self, folder: &FolderId, limit: usize) -> Result<Vec<Item>, StorageError> {
        Ok(self
            .lock()
            .items
            .values()
            .filter(|i| &i.folder_id == folder)
            .take(limit)
            .cloned()
            .collect())
    }

    fn child_files(&self, item: &ItemId, limit: usize) -> Result<Vec<FileRecord>, StorageError> {
        Ok(self
            .lock()
            .files
            .values()
            .filter(|f| &f.record.item_id == item)
            .take(limit)
            .map(|f| f.record.clone())
            .collect())
    }

    fn find_child_folder(
        &self,
        parent: &FolderId,
        name: &str,
    ) -> Result<Option<Folder>, StorageError> {
        Ok(self
            .lock()
            .folders
            .values()
            .find(|f| f.parent_id.as_ref() == Some(parent) && f.name == name)
            .cloned())
    }

    fn create_folder(
        &self,
        parent: &FolderId,
        name: &str,
        creator: &User,
    ) -> Result<Folder, StorageError> {
        let mut state = self.lock();
        if !state.folders.contains_key(parent) {
            return Err(StorageError::NotFound {
                kind: "folder",
                id: parent.to_string(),
            });
        }
        if state
            .folders
            .values()
            .any(|f| f.parent_id.as_ref() == Some(parent) && f.name == name)
        {
            return Err(StorageError::Conflict {
                parent: parent.clone(),
                name: name.to_string(),
            });
        }

        let folder = Folder {
            id: FolderId(self.fresh_id(&state)),
            name: name.to_string(),
            parent_id: Some(parent.clone()),
            creator_id: Some(creator.id.clone()),
            extra: Default::default(),
        };
        state.folders.insert(folder.id.clone(), folder.clone());
        self.record_mutation();
        Ok(folder)
    }

    fn open_file(&self, file: &FileRecord) -> Result<Box<dyn Read + Send>, StorageError> {
        let state = self.lock();
        let stored = state.files.get(&file.id).ok_or_else(|| StorageError::NotFound {
            kind: "file",
            id: file.id.to_string(),
        })?;
        Ok(Box::new(Cursor::new(Arc::clone(&stored.data))))
    }

    fn upload_file(&self, upload: NewUpload<'_>, data: &[u8]) -> Result<FileRecord, StorageError> {
        if upload.size != data.len() as u64 {
            return Err(StorageError::SizeMismatch {
                declared: upload.size,
                actual: data.len() as u64,
            });
        }

        let mut state = self.lock();
        if !state.folders.contains_key(upload.parent) {
            return Err(StorageError::NotFound {
                kind: "folder",
                id: upload.parent.to_string(),
            });
        }

        // Uploading into a folder wraps the file in a new item of the same name.
        let item = Item {
            id: ItemId(self.fresh_id(&state)),
            name: upload.name.to_string(),
            folder_id: upload.parent.clone(),
            creator_id: Some(upload.creator.id.clone()),
            extra: Default::default(),
        };
        state.items.insert(item.id.clone(), item.clone());

        let record = FileRecord {
            id: FileId(self.fresh_id(&state)),
            name: upload.name.to_string(),
            mime_type: Some(upload.mime_type.to_string()),
            size: upload.size,
            item_id: item.id,
            creator_id: Some(upload.creator.id.clone()),
            extra: Default::default(),
        };
        state.files.insert(
            record.id.clone(),
            StoredFile {
                record: record.clone(),
                data: data.into(),
            },
        );
        self.record_mutation();
        Ok(record)
    }

    fn save_submission(&self, submission: &Submission) -> Result<(), StorageError> {
        self.lock()
            .submissions
            .insert(submission.id.clone(), submission.clone());
        self.record_mutation();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: UserId::from("u1"),
            login: "alice".into(),
            extra: Default::default(),
        }
    }

    #[test]
    fn generated_ids_look_like_object_ids() {
        let storage = MemoryStorage::new();
        let folder = storage.add_folder("Submissions", None);
        assert_eq!(folder.id.as_str().len(), 24);
        assert!(folder.id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_ids_skip_ids_already_in_use() {
        let storage = MemoryStorage::new();
        storage.insert_folder(Folder {
            id: FolderId(format!("{:024x}", 1)),
            name: "taken".into(),
            parent_id: None,
            creator_id: None,
            extra: Default::default(),
        });
        let folder = storage.add_folder("fresh", None);
        assert_ne!(folder.id.as_str(), format!("{:024x}", 1));
    }

    #[test]
    fn child_listing_respects_limit() {
        let storage = MemoryStorage::new();
        let folder = storage.add_folder("sub", None);
        for i in 0..3 {
            storage.add_item(&folder.id, &format!("item{i}"));
        }
        assert_eq!(storage.child_items(&folder.id, 2).unwrap().len(), 2);
        assert_eq!(storage.child_items(&folder.id, 10).unwrap().len(), 3);
    }

    #[test]
    fn create_folder_rejects_duplicate_name() {
        let storage = MemoryStorage::new();
        let parent = storage.add_folder("sub", None);
        storage.create_folder(&parent.id, "Abstract", &user()).unwrap();

        let err = storage
            .create_folder(&parent.id, "Abstract", &user())
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert_eq!(storage.child_folders(&parent.id).len(), 1);
        assert_eq!(storage.mutation_count(), 1);
    }

    #[test]
    fn create_folder_requires_parent() {
        let storage = MemoryStorage::new();
        let err = storage
            .create_folder(&FolderId::from("missing"), "Abstract", &user())
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "folder", .. }));
    }

    #[test]
    fn upload_creates_item_and_file() {
        let storage = MemoryStorage::new();
        let folder = storage.add_folder("Abstract", None);
        let creator = user();
        let record = storage
            .upload_file(
                NewUpload {
                    parent: &folder.id,
                    name: "report.pdf",
                    mime_type: "application/pdf",
                    size: 4,
                    creator: &creator,
                },
                b"%PDF",
            )
            .unwrap();

        assert_eq!(record.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(record.creator_id, Some(creator.id.clone()));
        let items = storage.child_items(&folder.id, 10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "report.pdf");
        assert_eq!(storage.file_data(&record.id).unwrap(), b"%PDF");
        assert_eq!(storage.files_in_folder(&folder.id), vec![record]);
    }

    #[test]
    fn upload_checks_declared_size() {
        let storage = MemoryStorage::new();
        let folder = storage.add_folder("Abstract", None);
        let creator = user();
        let err = storage
            .upload_file(
                NewUpload {
                    parent: &folder.id,
                    name: "report.pdf",
                    mime_type: "application/pdf",
                    size: 10,
                    creator: &creator,
                },
                b"%PDF",
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::SizeMismatch {
                declared: 10,
                actual: 4
            }
        ));
        assert_eq!(storage.mutation_count(), 0);
    }

    #[test]
    fn open_file_streams_stored_bytes() {
        let storage = MemoryStorage::new();
        let folder = storage.add_folder("sub", None);
        let item = storage.add_item(&folder.id, "submission.zip");
        let file = storage.add_file(&item.id, "submission.zip", None, b"PK\x03\x04".to_vec());

        let mut buf = Vec::new();
        storage.open_file(&file).unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"PK\x03\x04");
    }

    #[test]
    fn snapshot_survives_json_file() {
        let storage = MemoryStorage::new();
        storage.insert_user(user());
        let folder = storage.add_folder("sub", None);
        let item = storage.add_item(&folder.id, "submission.zip");
        let file = storage.add_file(&item.id, "submission.zip", None, vec![0, 1, 2, 255]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        storage.save_json(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"data\": \"AAEC/w==\""));

        let restored = MemoryStorage::load_json(&path).unwrap();
        assert_eq!(restored.file_data(&file.id).unwrap(), vec![0, 1, 2, 255]);
        assert!(restored.load_user(&UserId::from("u1")).unwrap().is_some());
        assert_eq!(restored.mutation_count(), 0);
    }

    #[test]
    fn snapshot_keeps_untyped_platform_fields() {
        let raw = serde_json::json!({
            "users": [{"_id": "u1", "login": "alice", "email": "alice@example.org"}],
            "phases": [{
                "_id": "p1",
                "name": "Final Test",
                "meta": {"isic2018": "final"},
                "challengeId": "c1"
            }],
            "submissions": [{
                "_id": "s1",
                "phaseId": "p1",
                "folderId": "f1",
                "creatorId": "u1",
                "title": "Ensemble of U-Nets",
                "score": [{"dataset": "final", "metrics": [0.81]}],
                "approach": "default",
                "latest": true
            }],
            "folders": [{"_id": "f1", "name": "submission", "parentId": null, "public": false}],
            "items": [{"_id": "i1", "name": "submission.zip", "folderId": "f1", "size": 4}],
            "files": [{
                "_id": "z1",
                "name": "submission.zip",
                "size": 4,
                "itemId": "i1",
                "assetstoreId": "a1",
                "data": "UEsDBA=="
            }]
        });

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        let output = dir.path().join("out.json");
        std::fs::write(&input, raw.to_string()).unwrap();

        let storage = MemoryStorage::load_json(&input).unwrap();
        let submission = storage
            .load_submission(&SubmissionId::from("s1"))
            .unwrap()
            .unwrap();
        assert_eq!(submission.extra["approach"], "default");
        storage.save_json(&output).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let saved_submission = &saved["submissions"][0];
        assert_eq!(saved_submission["title"], "Ensemble of U-Nets");
        assert_eq!(saved_submission["score"], raw["submissions"][0]["score"]);
        assert_eq!(saved_submission["latest"], true);
        assert!(saved_submission.get("documentationUrl").is_none());
        assert_eq!(saved["users"][0]["email"], "alice@example.org");
        assert_eq!(saved["phases"][0]["challengeId"], "c1");
        assert_eq!(saved["phases"][0]["meta"]["isic2018"], "final");
        assert_eq!(saved["folders"][0]["public"], false);
        assert_eq!(saved["items"][0]["size"], 4);
        assert_eq!(saved["files"][0]["assetstoreId"], "a1");
        assert_eq!(saved["files"][0]["data"], "UEsDBA==");
        assert_eq!(
            storage.file_data(&FileId::from("z1")).unwrap(),
            b"PK\x03\x04"
        );
    }
}
