//! In-memory adapters for testing and embedding.

use crate::cancel::CancelToken;
use crate::error::{SyncError, SyncResult};
use crate::source::{ContactSource, DevicePermission};
use crate::store::ContactStore;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use synchro_model::{DeviceContact, DeviceFields, RemoteContact, RemoteFields};

/// Write counters, used to assert that a run touched nothing.
#[derive(Debug, Default)]
struct WriteCounters {
    creates: AtomicU64,
    updates: AtomicU64,
}

impl WriteCounters {
    fn total(&self) -> u64 {
        self.creates.load(Ordering::SeqCst) + self.updates.load(Ordering::SeqCst)
    }
}

/// An in-memory device address book.
pub struct MemoryContactSource {
    contacts: RwLock<Vec<DeviceContact>>,
    permission: RwLock<DevicePermission>,
    failing_names: RwLock<HashSet<String>>,
    fail_listing: AtomicBool,
    list_ids_supported: AtomicBool,
    next_id: AtomicU64,
    writes: WriteCounters,
}

impl MemoryContactSource {
    /// Creates an empty source with full permission.
    pub fn new() -> Self {
        Self {
            contacts: RwLock::new(Vec::new()),
            permission: RwLock::new(DevicePermission::Full),
            failing_names: RwLock::new(HashSet::new()),
            fail_listing: AtomicBool::new(false),
            list_ids_supported: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            writes: WriteCounters::default(),
        }
    }

    /// Creates a source holding `contacts`.
    pub fn with_contacts(contacts: Vec<DeviceContact>) -> Self {
        let source = Self::new();
        *source.contacts.write() = contacts;
        source
    }

    /// Adds a contact directly, bypassing write counters.
    pub fn insert(&self, contact: DeviceContact) {
        self.contacts.write().push(contact);
    }

    /// Sets the reported permission level.
    pub fn set_permission(&self, permission: DevicePermission) {
        *self.permission.write() = permission;
    }

    /// Makes writes to contacts with this name fail.
    pub fn fail_writes_for(&self, name: impl Into<String>) {
        self.failing_names.write().insert(name.into());
    }

    /// Makes `list_all` fail.
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Enables or disables the id-listing fallback.
    pub fn set_list_ids_supported(&self, supported: bool) {
        self.list_ids_supported.store(supported, Ordering::SeqCst);
    }

    /// Snapshot of all contacts.
    pub fn contacts(&self) -> Vec<DeviceContact> {
        self.contacts.read().clone()
    }

    /// Number of contacts.
    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    /// Returns true if there are no contacts.
    pub fn is_empty(&self) -> bool {
        self.contacts.read().is_empty()
    }

    /// Total creates and updates performed through the trait.
    pub fn write_count(&self) -> u64 {
        self.writes.total()
    }

    fn check_write(&self, name: &str) -> SyncResult<()> {
        if self.failing_names.read().contains(name) {
            return Err(SyncError::Source(format!("write refused for '{}'", name)));
        }
        Ok(())
    }
}

impl Default for MemoryContactSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactSource for MemoryContactSource {
    fn permission(&self, cancel: &CancelToken) -> SyncResult<DevicePermission> {
        cancel.check()?;
        Ok(*self.permission.read())
    }

    fn list_all(&self, cancel: &CancelToken) -> SyncResult<Vec<DeviceContact>> {
        cancel.check()?;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(SyncError::Source("bulk listing failed".into()));
        }
        Ok(self.contacts())
    }

    fn list_ids(&self, cancel: &CancelToken) -> SyncResult<Vec<String>> {
        cancel.check()?;
        if !self.list_ids_supported.load(Ordering::SeqCst) {
            return Err(SyncError::Unsupported("listing device contact ids"));
        }
        Ok(self
            .contacts
            .read()
            .iter()
            .filter_map(|c| c.device_id().map(str::to_string))
            .collect())
    }

    fn create(&self, fields: &DeviceFields, cancel: &CancelToken) -> SyncResult<String> {
        cancel.check()?;
        self.check_write(fields.name.as_deref().unwrap_or_default())?;

        let id = format!("device-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.contacts
            .write()
            .push(DeviceContact::from_fields(id.clone(), fields));
        self.writes.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn update(&self, id: &str, fields: &DeviceFields, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        let mut contacts = self.contacts.write();
        let contact = contacts
            .iter_mut()
            .find(|c| c.device_id() == Some(id))
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        self.check_write(&contact.name)?;

        contact.apply(fields);
        self.writes.updates.fetch_add(1, Ordering::SeqCst);
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

/// An in-memory CRM store.
pub struct MemoryContactStore {
    contacts: RwLock<Vec<RemoteContact>>,
    failing_names: RwLock<HashSet<String>>,
    fail_listing: AtomicBool,
    next_id: AtomicU64,
    writes: WriteCounters,
}

impl MemoryContactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            contacts: RwLock::new(Vec::new()),
            failing_names: RwLock::new(HashSet::new()),
            fail_listing: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            writes: WriteCounters::default(),
        }
    }

    /// Creates a store holding `contacts`.
    pub fn with_contacts(contacts: Vec<RemoteContact>) -> Self {
        let store = Self::new();
        *store.contacts.write() = contacts;
        store
    }

    /// Adds a contact directly, bypassing write counters.
    pub fn insert(&self, contact: RemoteContact) {
        self.contacts.write().push(contact);
    }

    /// Makes writes to contacts with this name fail.
    pub fn fail_writes_for(&self, name: impl Into<String>) {
        self.failing_names.write().insert(name.into());
    }

    /// Makes `list_all` fail.
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all contacts.
    pub fn contacts(&self) -> Vec<RemoteContact> {
        self.contacts.read().clone()
    }

    /// Looks up a contact by id.
    pub fn get(&self, id: &str) -> Option<RemoteContact> {
        self.contacts.read().iter().find(|c| c.id == id).cloned()
    }

    /// Number of contacts.
    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    /// Returns true if there are no contacts.
    pub fn is_empty(&self) -> bool {
        self.contacts.read().is_empty()
    }

    /// Total creates and updates performed through the trait.
    pub fn write_count(&self) -> u64 {
        self.writes.total()
    }

    fn check_write(&self, name: &str) -> SyncResult<()> {
        if self.failing_names.read().contains(name) {
            return Err(SyncError::ServerError(format!(
                "500: could not save '{}'",
                name
            )));
        }
        Ok(())
    }
}

impl Default for MemoryContactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactStore for MemoryContactStore {
    fn list_all(&self, cancel: &CancelToken) -> SyncResult<Vec<RemoteContact>> {
        cancel.check()?;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("connection reset"));
        }
        Ok(self.contacts())
    }

    fn create(&self, fields: &RemoteFields, cancel: &CancelToken) -> SyncResult<String> {
        cancel.check()?;
        let name = fields.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(SyncError::Rejected {
                status: 422,
                message: "name is required".into(),
            });
        }
        self.check_write(name)?;

        let id = format!("remote-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.contacts
            .write()
            .push(RemoteContact::from_fields(id.clone(), fields));
        self.writes.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn update(&self, id: &str, fields: &RemoteFields, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        let mut contacts = self.contacts.write();
        let contact = contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        self.check_write(&contact.name)?;

        contact.apply(fields);
        self.writes.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_by_id(&self, id: &str, cancel: &CancelToken) -> SyncResult<Option<RemoteContact>> {
        cancel.check()?;
        Ok(self.get(id))
    }
}
