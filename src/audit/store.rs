//! Object storage boundary for the daily audit logs

use crate::error::StoreError;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// An object as fetched from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: String,
    /// Opaque token identifying this stored state
    pub version: String,
}

/// Condition a conditional write must still satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The object must not exist yet
    Absent,
    /// The object must still be at this version
    Version(String),
}

/// Key-addressed object storage.
///
/// `get` returns `Ok(None)` for a missing object; every other failure is an
/// error. `put` overwrites unconditionally, `put_if` fails with
/// [`StoreError::PreconditionFailed`] when the object changed since it was
/// fetched.
pub trait ObjectStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Write the whole object, returning its new version
    fn put(&self, key: &str, body: &str) -> Result<String, StoreError>;

    fn put_if(
        &self,
        key: &str,
        body: &str,
        precondition: &Precondition,
    ) -> Result<String, StoreError>;
}

fn check_precondition(
    key: &str,
    current: Option<&str>,
    precondition: &Precondition,
) -> Result<(), StoreError> {
    let holds = match (precondition, current) {
        (Precondition::Absent, None) => true,
        (Precondition::Version(expected), Some(actual)) => expected == actual,
        _ => false,
    };
    if holds {
        Ok(())
    } else {
        Err(StoreError::PreconditionFailed {
            key: key.to_string(),
        })
    }
}

/// In-process object store with per-key generation counters
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (String, u64)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(
        &self,
        key: &str,
        body: &str,
        precondition: Option<&Precondition>,
    ) -> Result<String, StoreError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))?;

        let current = objects.get(key).map(|(_, generation)| *generation);
        if let Some(precondition) = precondition {
            let current_version = current.map(|g| g.to_string());
            check_precondition(key, current_version.as_deref(), precondition)?;
        }

        let generation = current.map_or(1, |g| g + 1);
        objects.insert(key.to_string(), (body.to_string(), generation));
        Ok(generation.to_string())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let objects = self
            .objects
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))?;

        Ok(objects.get(key).map(|(body, generation)| StoredObject {
            body: body.clone(),
            version: generation.to_string(),
        }))
    }

    fn put(&self, key: &str, body: &str) -> Result<String, StoreError> {
        self.write(key, body, None)
    }

    fn put_if(
        &self,
        key: &str,
        body: &str,
        precondition: &Precondition,
    ) -> Result<String, StoreError> {
        self.write(key, body, Some(precondition))
    }
}

/// Object store mapping keys to files under a root directory.
///
/// Writes go to a temp file that is renamed over the target. Conditional
/// writes are serialized within this process only.
pub struct FsObjectStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsObjectStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::Backend(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(relative))
    }

    fn read(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let path = self.object_path(key)?;
        match fs::read_to_string(&path) {
            Ok(body) => {
                let version = content_version(&body);
                Ok(Some(StoredObject { body, version }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, body: &str) -> Result<String, StoreError> {
        let path = self.object_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::Backend(format!("invalid object key '{key}'")))?;
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        fs::write(&tmp_path, body)?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(key = %key, bytes = body.len(), "Object written");
        Ok(content_version(body))
    }
}

impl ObjectStore for FsObjectStore {
    fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        self.read(key)
    }

    fn put(&self, key: &str, body: &str) -> Result<String, StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Io(io::Error::other("write lock poisoned")))?;
        self.write(key, body)
    }

    fn put_if(
        &self,
        key: &str,
        body: &str,
        precondition: &Precondition,
    ) -> Result<String, StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Io(io::Error::other("write lock poisoned")))?;

        let current = self.read(key)?;
        check_precondition(key, current.as_ref().map(|o| o.version.as_str()), precondition)?;
        self.write(key, body)
    }
}

/// Version token of file content
fn content_version(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("{:016x}-{}", hasher.finish(), body.len())
}
