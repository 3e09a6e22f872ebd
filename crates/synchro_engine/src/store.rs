//! Remote contact store abstraction.

use crate::cancel::CancelToken;
use crate::error::SyncResult;
use synchro_model::{RemoteContact, RemoteFields};

/// Reads and writes the CRM record store.
///
/// One call per contact per operation; no batch endpoint is assumed.
/// `create` and `update` send only the fields that are set, so a link-only
/// patch never touches contact data.
pub trait ContactStore: Send + Sync {
    /// Lists every remote contact.
    fn list_all(&self, cancel: &CancelToken) -> SyncResult<Vec<RemoteContact>>;

    /// Creates a contact and returns the store-assigned identifier.
    fn create(&self, fields: &RemoteFields, cancel: &CancelToken) -> SyncResult<String>;

    /// Writes the supplied fields onto an existing contact.
    fn update(&self, id: &str, fields: &RemoteFields, cancel: &CancelToken) -> SyncResult<()>;

    /// Fetches a single contact.
    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> SyncResult<Option<RemoteContact>>;
}
