//! Warm restart state for syncd
//!
//! On a warm shutdown the daemon saves one image per switch: its current
//! view, the VID/RID bindings of its objects and the notification sequence
//! reached. A warm start restores the images before the first request is
//! read, so clients keep using the VIDs they hold and a view transaction
//! replaying the same configuration reconciles to an empty plan.
//!
//! ## File layout
//!
//! `FileStateStore` writes `<state_dir>/switch-<vid hex>.json`. Each file is
//! written to a temporary sibling, flushed and renamed over the old one, so a
//! crash mid-save leaves the previous image intact.
//!
//! ## NIST 800-53 Compliance
//! - CP-10: Virtual ids and bindings survive a warm restart
//! - SI-7: Image version checked before use

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sonic_sai::ObjectId;
use sonic_sairedis::View;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Version written into every image.
pub const IMAGE_VERSION: u32 = 1;

const FILE_PREFIX: &str = "switch-";
const FILE_SUFFIX: &str = ".json";

/// Persisted state of one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchImage {
    pub version: u32,
    pub switch_index: u8,
    /// Current view, in VIDs.
    pub view: View,
    /// VID to RID bindings of the switch's id-keyed objects.
    pub bindings: BTreeMap<ObjectId, ObjectId>,
    /// Last notification sequence number issued for the switch.
    #[serde(default)]
    pub notification_sequence: u64,
    pub saved_at: DateTime<Utc>,
}

impl SwitchImage {
    pub fn new(view: View, bindings: BTreeMap<ObjectId, ObjectId>, notification_sequence: u64) -> Self {
        Self {
            version: IMAGE_VERSION,
            switch_index: view.switch_id.switch_index(),
            view,
            bindings,
            notification_sequence,
            saved_at: Utc::now(),
        }
    }

    pub fn switch_id(&self) -> ObjectId {
        self.view.switch_id
    }

    /// RID of the switch object itself.
    pub fn switch_rid(&self) -> Option<ObjectId> {
        self.bindings.get(&self.view.switch_id).copied()
    }

    fn check_version(&self) -> Result<(), StoreError> {
        if self.version != IMAGE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: self.version,
                expected: IMAGE_VERSION,
            });
        }
        Ok(())
    }
}

/// Durable storage for switch images.
pub trait StateStore: Send + Sync {
    fn save(&self, image: &SwitchImage) -> Result<(), StoreError>;

    fn load(&self, switch_id: ObjectId) -> Result<SwitchImage, StoreError>;

    /// Switches with a saved image, in id order.
    fn list(&self) -> Result<Vec<ObjectId>, StoreError>;

    fn remove(&self, switch_id: ObjectId) -> Result<(), StoreError>;
}

/// Images as JSON files in one directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, switch_id: ObjectId) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{:016x}{FILE_SUFFIX}", switch_id.as_raw()))
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl StateStore for FileStateStore {
    fn save(&self, image: &SwitchImage) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;

        let path = self.path_for(image.switch_id());
        let json = serde_json::to_string_pretty(image).map_err(|e| StoreError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Self::io_error(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| Self::io_error(&path, e.error))?;

        info!(
            switch_id = %image.switch_id(),
            objects = image.view.len(),
            bindings = image.bindings.len(),
            path = %path.display(),
            "saved switch state"
        );
        Ok(())
    }

    fn load(&self, switch_id: ObjectId) -> Result<SwitchImage, StoreError> {
        let path = self.path_for(switch_id);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(switch_id))
            }
            Err(e) => return Err(Self::io_error(&path, e)),
        };

        let image: SwitchImage = serde_json::from_str(&json).map_err(|e| StoreError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        image.check_version()?;
        if image.switch_id() != switch_id {
            return Err(StoreError::Malformed {
                path,
                reason: format!("holds switch {}", image.switch_id()),
            });
        }
        debug!(%switch_id, objects = image.view.len(), "loaded switch state");
        Ok(image)
    }

    fn list(&self) -> Result<Vec<ObjectId>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Self::io_error(&self.dir, e))?;
            let name = entry.file_name();
            let Some(hex) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            if let Ok(raw) = u64::from_str_radix(hex, 16) {
                ids.push(ObjectId::from_raw(raw));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn remove(&self, switch_id: ObjectId) -> Result<(), StoreError> {
        let path = self.path_for(switch_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}

/// Images kept in memory; survives a daemon restart within one process.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    images: Mutex<BTreeMap<ObjectId, SwitchImage>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, image: &SwitchImage) -> Result<(), StoreError> {
        self.images.lock().insert(image.switch_id(), image.clone());
        Ok(())
    }

    fn load(&self, switch_id: ObjectId) -> Result<SwitchImage, StoreError> {
        let image = self
            .images
            .lock()
            .get(&switch_id)
            .cloned()
            .ok_or(StoreError::NotFound(switch_id))?;
        image.check_version()?;
        Ok(image)
    }

    fn list(&self) -> Result<Vec<ObjectId>, StoreError> {
        Ok(self.images.lock().keys().copied().collect())
    }

    fn remove(&self, switch_id: ObjectId) -> Result<(), StoreError> {
        self.images.lock().remove(&switch_id);
        Ok(())
    }
}
