//! A device address book kept in a JSON file.
//!
//! The file holds an array of device contacts. Contacts without an id get a
//! UUID when the file is opened; every write rewrites the file.

use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use synchro_engine::{CancelToken, ContactSource, DevicePermission, SyncError, SyncResult};
use synchro_model::{DeviceContact, DeviceFields};
use thiserror::Error;
use tracing::debug;

/// Errors reading or writing the contact file.
#[derive(Debug, Error)]
pub enum DeviceFileError {
    /// The file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The file is not a JSON array of contacts.
    #[error("{path}: invalid contact file: {source}")]
    Json {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

impl From<DeviceFileError> for SyncError {
    fn from(err: DeviceFileError) -> Self {
        SyncError::Source(err.to_string())
    }
}

/// A [`ContactSource`] over a JSON file.
pub struct JsonFileSource {
    path: PathBuf,
    contacts: RwLock<Vec<DeviceContact>>,
}

impl JsonFileSource {
    /// Opens `path`; a missing file is an empty address book.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DeviceFileError> {
        let path = path.into();
        let mut contacts: Vec<DeviceContact> = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| DeviceFileError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(DeviceFileError::Io { path, source }),
        };

        let mut assigned = 0usize;
        for contact in contacts.iter_mut().filter(|c| c.device_id().is_none()) {
            contact.id = Some(new_id());
            assigned += 1;
        }

        let source = Self {
            path,
            contacts: RwLock::new(contacts),
        };
        if assigned > 0 {
            debug!(assigned, path = %source.path.display(), "assigned ids to device contacts");
            source.save(&source.contacts.read())?;
        }
        Ok(source)
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of all contacts.
    pub fn contacts(&self) -> Vec<DeviceContact> {
        self.contacts.read().clone()
    }

    fn save(&self, contacts: &[DeviceContact]) -> Result<(), DeviceFileError> {
        let bytes = serde_json::to_vec_pretty(contacts).map_err(|source| DeviceFileError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, bytes).map_err(|source| DeviceFileError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ContactSource for JsonFileSource {
    fn permission(&self, cancel: &CancelToken) -> SyncResult<DevicePermission> {
        cancel.check()?;
        Ok(DevicePermission::Full)
    }

    fn list_all(&self, cancel: &CancelToken) -> SyncResult<Vec<DeviceContact>> {
        cancel.check()?;
        Ok(self.contacts())
    }

    fn list_ids(&self, cancel: &CancelToken) -> SyncResult<Vec<String>> {
        cancel.check()?;
        Ok(self
            .contacts
            .read()
            .iter()
            .filter_map(|c| c.device_id().map(str::to_string))
            .collect())
    }

    fn create(&self, fields: &DeviceFields, cancel: &CancelToken) -> SyncResult<String> {
        cancel.check()?;
        let id = new_id();
        let mut contacts = self.contacts.write();
        contacts.push(DeviceContact::from_fields(id.clone(), fields));
        if let Err(e) = self.save(&contacts) {
            contacts.pop();
            return Err(e.into());
        }
        Ok(id)
    }

    fn update(&self, id: &str, fields: &DeviceFields, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        let mut contacts = self.contacts.write();
        let position = contacts
            .iter()
            .position(|c| c.device_id() == Some(id))
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        let previous = contacts[position].clone();
        contacts[position].apply(fields);
        if let Err(e) = self.save(&contacts) {
            contacts[position] = previous;
            return Err(e.into());
        }
        Ok(())
    }

    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> SyncResult<Option<DeviceContact>> {
        cancel.check()?;
        Ok(self
            .contacts
            .read()
            .iter()
            .find(|c| c.device_id() == Some(id))
            .cloned())
    }
}
