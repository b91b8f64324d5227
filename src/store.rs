use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;

use super::{blake3_hash, Record, RecordPatch, RecordSummary, Snapshot, ToolError};

const ID_HEX_LEN: usize = 16;

/// Flat-file record store. One JSON file per record under `records/`, one
/// JSON file per superseded version under `snapshots/`. All writes go
/// through a temp file and rename so a crash never leaves a half-written
/// primary in place.
pub(crate) struct RecordStore {
    records_dir: PathBuf,
    snapshots_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    generation: AtomicU64,
}

impl RecordStore {
    pub(crate) fn open(root: &Path) -> Result<Self, ToolError> {
        let records_dir = root.join("records");
        let snapshots_dir = root.join("snapshots");
        fs::create_dir_all(&records_dir)
            .map_err(|e| ToolError::Storage(format!("create {}: {e}", records_dir.display())))?;
        fs::create_dir_all(&snapshots_dir)
            .map_err(|e| ToolError::Storage(format!("create {}: {e}", snapshots_dir.display())))?;
        Ok(RecordStore {
            records_dir,
            snapshots_dir,
            locks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// Monotone counter bumped on every successful mutation. The semantic
    /// index compares this against the generation it was built from.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut map = unpoison(self.locks.lock());
        map.entry(id.to_string()).or_default().clone()
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.records_dir.join(format!("{id}.json"))
    }

    fn snapshot_path(&self, id: &str, version: u64) -> PathBuf {
        self.snapshots_dir.join(format!("{id}-v{version}.json"))
    }

    fn generate_id(&self, body: &str) -> Result<String, ToolError> {
        let mut salt: u64 = 0;
        loop {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            let material = format!("{nanos}:{salt}:{body}");
            let id = blake3_hash(material.as_bytes()).to_hex()[..ID_HEX_LEN].to_string();
            if !self.record_path(&id).exists() {
                return Ok(id);
            }
            salt = salt
                .checked_add(1)
                .ok_or_else(|| ToolError::Storage("id space exhausted".to_string()))?;
        }
    }

    // ── CRUD ─────────────────────────────────────────────────────────────

    pub(crate) fn create(
        &self,
        body: String,
        tags: Vec<String>,
        metadata: std::collections::BTreeMap<String, serde_json::Value>,
    ) -> Result<Record, ToolError> {
        let id = self.generate_id(&body)?;
        let record = Record {
            id: id.clone(),
            body,
            tags,
            metadata,
            version: 1,
        };
        write_json_atomic(&self.record_path(&id), &record)?;
        self.bump_generation();
        Ok(record)
    }

    pub(crate) fn read(&self, id: &str) -> Result<Record, ToolError> {
        check_id(id)?;
        let path = self.record_path(id);
        if !path.exists() {
            return Err(ToolError::NotFound(format!("no record '{id}'")));
        }
        read_json(&path)
    }

    /// Versioned update. The current state is snapshotted durably before the
    /// primary file is replaced; if the snapshot cannot be written the
    /// update aborts and the primary is untouched.
    pub(crate) fn update(&self, id: &str, patch: RecordPatch) -> Result<Record, ToolError> {
        check_id(id)?;
        let lock = self.lock_for(id);
        let _guard = unpoison(lock.lock());

        let current = self.read(id)?;
        let snapshot = Snapshot {
            record: current.clone(),
            captured_at: Utc::now().to_rfc3339(),
        };
        write_json_atomic(&self.snapshot_path(id, current.version), &snapshot)?;

        let mut next = current;
        if let Some(body) = patch.body {
            next.body = body;
        }
        if let Some(tags) = patch.tags {
            next.tags = tags;
        }
        if let Some(metadata) = patch.metadata {
            for (key, value) in metadata {
                next.metadata.insert(key, value);
            }
        }
        next.version += 1;
        write_json_atomic(&self.record_path(id), &next)?;
        self.bump_generation();
        Ok(next)
    }

    /// Removes the primary file only. Snapshots survive deletion and stay
    /// readable until purged.
    pub(crate) fn delete(&self, id: &str) -> Result<(), ToolError> {
        check_id(id)?;
        let lock = self.lock_for(id);
        let _guard = unpoison(lock.lock());

        let path = self.record_path(id);
        if !path.exists() {
            return Err(ToolError::NotFound(format!("no record '{id}'")));
        }
        fs::remove_file(&path)
            .map_err(|e| ToolError::Storage(format!("delete {}: {e}", path.display())))?;
        self.bump_generation();
        Ok(())
    }

    /// Enumeration order follows the filesystem and is unspecified.
    pub(crate) fn list(&self) -> Result<Vec<RecordSummary>, ToolError> {
        Ok(self
            .list_records()?
            .into_iter()
            .map(|r| RecordSummary {
                id: r.id,
                version: r.version,
                tags: r.tags,
            })
            .collect())
    }

    pub(crate) fn list_records(&self) -> Result<Vec<Record>, ToolError> {
        let entries = fs::read_dir(&self.records_dir)
            .map_err(|e| ToolError::Storage(format!("list {}: {e}", self.records_dir.display())))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ToolError::Storage(format!("list records: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Record>(&path) {
                Ok(record) => records.push(record),
                Err(err) => {
                    eprintln!("[store] skipping unreadable {}: {err}", path.display());
                }
            }
        }
        Ok(records)
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    /// Newest first by version.
    pub(crate) fn list_snapshots(&self, id: &str) -> Result<Vec<Snapshot>, ToolError> {
        check_id(id)?;
        let entries = fs::read_dir(&self.snapshots_dir).map_err(|e| {
            ToolError::Storage(format!("list {}: {e}", self.snapshots_dir.display()))
        })?;
        let prefix = format!("{id}-v");
        let mut snapshots = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ToolError::Storage(format!("list snapshots: {e}")))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            match read_json::<Snapshot>(&path) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => {
                    eprintln!("[store] skipping unreadable {}: {err}", path.display());
                }
            }
        }
        snapshots.sort_by(|a, b| b.version().cmp(&a.version()));
        Ok(snapshots)
    }

    pub(crate) fn read_snapshot(&self, id: &str, version: u64) -> Result<Snapshot, ToolError> {
        check_id(id)?;
        let path = self.snapshot_path(id, version);
        if !path.exists() {
            return Err(ToolError::NotFound(format!(
                "no snapshot of '{id}' at version {version}"
            )));
        }
        read_json(&path)
    }

    /// Applies a snapshot's content back onto the live record as a normal
    /// versioned update, so the restore itself leaves a snapshot behind.
    pub(crate) fn restore(&self, id: &str, version: u64) -> Result<Record, ToolError> {
        let snapshot = self.read_snapshot(id, version)?;
        self.update(
            id,
            RecordPatch {
                body: Some(snapshot.record.body),
                tags: Some(snapshot.record.tags),
                metadata: Some(snapshot.record.metadata),
            },
        )
    }

    /// Deletes every snapshot of `id`. Retention is otherwise unbounded.
    pub(crate) fn purge_snapshots(&self, id: &str) -> Result<usize, ToolError> {
        check_id(id)?;
        let lock = self.lock_for(id);
        let _guard = unpoison(lock.lock());

        let entries = fs::read_dir(&self.snapshots_dir).map_err(|e| {
            ToolError::Storage(format!("list {}: {e}", self.snapshots_dir.display()))
        })?;
        let prefix = format!("{id}-v");
        let mut removed = 0usize;
        for entry in entries {
            let entry =
                entry.map_err(|e| ToolError::Storage(format!("purge snapshots: {e}")))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".json") {
                fs::remove_file(&path)
                    .map_err(|e| ToolError::Storage(format!("purge {}: {e}", path.display())))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn unpoison<'a, T>(
    result: Result<MutexGuard<'a, T>, std::sync::PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ids are hex strings we generated; anything else is rejected before it can
/// touch a path.
fn check_id(id: &str) -> Result<(), ToolError> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ToolError::Validation(format!("malformed id '{id}'")));
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ToolError> {
    let bytes = fs::read(path)
        .map_err(|e| ToolError::Storage(format!("read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ToolError::Storage(format!("parse {}: {e}", path.display())))
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ToolError> {
    let payload = serde_json::to_vec_pretty(value)
        .map_err(|e| ToolError::Storage(format!("encode {}: {e}", path.display())))?;
    let parent = path
        .parent()
        .ok_or_else(|| ToolError::Storage(format!("no parent for {}", path.display())))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let tmp = parent.join(format!(".tmp-{}-{nanos}", std::process::id()));
    let mut file = fs::File::create(&tmp)
        .map_err(|e| ToolError::Storage(format!("create {}: {e}", tmp.display())))?;
    let written = file
        .write_all(&payload)
        .and_then(|_| file.sync_all())
        .map_err(|e| ToolError::Storage(format!("write {}: {e}", tmp.display())));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ToolError::Storage(format!("rename into {}: {e}", path.display()))
    })
}
