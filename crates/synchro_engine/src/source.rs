//! Device contact source abstraction.

use crate::cancel::CancelToken;
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use synchro_model::{DeviceContact, DeviceFields};

/// Access level granted by the device contact directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePermission {
    /// Every contact is readable and writable.
    Full,
    /// Only a user-selected subset is visible.
    Limited,
    /// The user refused access.
    Denied,
    /// The platform has no contact directory.
    Unavailable,
}

impl DevicePermission {
    /// The run-aborting error for a level that does not allow access.
    pub fn to_error(&self) -> Option<SyncError> {
        match self {
            DevicePermission::Denied => Some(SyncError::PermissionDenied(
                "access to device contacts was denied".into(),
            )),
            DevicePermission::Unavailable => Some(SyncError::Unavailable(
                "this platform has no contact directory".into(),
            )),
            DevicePermission::Full | DevicePermission::Limited => None,
        }
    }
}

/// Reads and writes the device address book.
///
/// `list_all` returns a best-effort snapshot; a limited permission may yield
/// fewer records and that is not an error. `create` and `update` write only
/// the fields that are set.
pub trait ContactSource: Send + Sync {
    /// Reports the current access level.
    fn permission(&self, cancel: &CancelToken) -> SyncResult<DevicePermission>;

    /// Lists every readable contact with the full field set.
    fn list_all(&self, cancel: &CancelToken) -> SyncResult<Vec<DeviceContact>>;

    /// Lists contact identifiers only.
    ///
    /// Used as a fallback when bulk listing fails: the engine then fetches
    /// records one by one with [`ContactSource::get_by_id`].
    fn list_ids(&self, _cancel: &CancelToken) -> SyncResult<Vec<String>> {
        Err(SyncError::Unsupported("listing device contact ids"))
    }

    /// Creates a contact and returns its device identifier.
    fn create(&self, fields: &DeviceFields, cancel: &CancelToken) -> SyncResult<String>;

    /// Writes the supplied fields onto an existing contact.
    fn update(&self, id: &str, fields: &DeviceFields, cancel: &CancelToken) -> SyncResult<()>;

    /// Fetches a single contact.
    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> SyncResult<Option<DeviceContact>>;
}

/// A source for platforms without a contact directory.
///
/// Selected at startup when no directory is available; every run against it
/// stops at the permission check.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullContactSource;

impl ContactSource for NullContactSource {
    fn permission(&self, _cancel: &CancelToken) -> SyncResult<DevicePermission> {
        Ok(DevicePermission::Unavailable)
    }

    fn list_all(&self, _cancel: &CancelToken) -> SyncResult<Vec<DeviceContact>> {
        Ok(Vec::new())
    }

    fn create(&self, _fields: &DeviceFields, _cancel: &CancelToken) -> SyncResult<String> {
        Err(SyncError::Unavailable("cannot create device contacts".into()))
    }

    fn update(&self, _id: &str, _fields: &DeviceFields, _cancel: &CancelToken) -> SyncResult<()> {
        Err(SyncError::Unavailable("cannot update device contacts".into()))
    }

    fn get_by_id(&self, _id: &str, _cancel: &CancelToken) -> SyncResult<Option<DeviceContact>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_levels() {
        assert!(DevicePermission::Full.to_error().is_none());
        assert!(matches!(
            DevicePermission::Denied.to_error(),
            Some(SyncError::PermissionDenied(_))
        ));
        assert!(DevicePermission::Limited.to_error().is_none());
    }

    #[test]
    fn null_source_is_unavailable() {
        let source = NullContactSource;
        let cancel = CancelToken::new();
        assert_eq!(
            source.permission(&cancel).unwrap(),
            DevicePermission::Unavailable
        );
        assert!(source.list_all(&cancel).unwrap().is_empty());
        assert!(matches!(
            source.list_ids(&cancel),
            Err(SyncError::Unsupported(_))
        ));
        assert!(source.create(&DeviceFields::default(), &cancel).is_err());
    }
}
