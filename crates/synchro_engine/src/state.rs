//! Reconciliation engine and its run state machine.
//!
//! A run moves through `Fetching → Indexing → DeviceToRemote →
//! RemoteToDevice → Reporting → Done`. Preconditions (permission, an
//! unreadable collection) fail the run with a single error; anything that
//! goes wrong for one contact is recorded in the report and the loop moves
//! on to the next contact.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::matching::{classify, ContactIndex, Correspondence, MatchProbe, MatchStrategy, Matcher};
use crate::report::{SyncMode, SyncReport};
use crate::source::{ContactSource, DevicePermission};
use crate::store::ContactStore;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use synchro_model::{DeviceContact, RemoteContact, RemoteFields};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No run has started yet.
    Idle,
    /// Reading permission and both collections.
    Fetching,
    /// Building lookup indices.
    Indexing,
    /// Importing and linking device contacts.
    DeviceToRemote,
    /// Pushing, linking and creating on the device.
    RemoteToDevice,
    /// Finalizing the report.
    Reporting,
    /// The last run finished (possibly with per-record errors).
    Done,
    /// The last run was aborted by a precondition failure.
    Failed,
}

impl SyncState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle | SyncState::Done | SyncState::Failed)
    }

    /// Returns true if the engine can start a new run.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Cumulative statistics across runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that reached `Done`.
    pub runs_completed: u64,
    /// Runs that ended in `Failed`.
    pub runs_failed: u64,
    /// Remote contacts imported.
    pub contacts_imported: u64,
    /// Remote contacts synced back to the device.
    pub contacts_synced_back: u64,
    /// Per-record errors recorded.
    pub record_errors: u64,
    /// Retries of per-record writes.
    pub retries: u64,
    /// When the last run ended.
    pub last_run_time: Option<Instant>,
    /// Run-aborting error of the last run, if any.
    pub last_error: Option<String>,
}

/// Bookkeeping that lives for one run.
#[derive(Debug, Default)]
struct RunLedger {
    /// Remote ids linked or imported while walking device contacts.
    linked_this_run: HashSet<String>,
    /// Remote ids whose link resolves to no device contact (repair mode).
    dangling: HashSet<String>,
}

/// Reconciles a device contact source with a remote contact store.
///
/// Only one run executes at a time per engine; starting another while one is
/// active fails with [`SyncError::AlreadyRunning`].
pub struct SyncEngine<S: ContactSource, R: ContactStore> {
    config: SyncConfig,
    source: Arc<S>,
    store: Arc<R>,
    matcher: Matcher,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancel: CancelToken,
}

impl<S: ContactSource, R: ContactStore> SyncEngine<S, R> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, source: S, store: R) -> Self {
        Self::with_shared(config, Arc::new(source), Arc::new(store))
    }

    /// Creates an engine over adapters that are shared with the caller.
    pub fn with_shared(config: SyncConfig, source: Arc<S>, store: Arc<R>) -> Self {
        let matcher = Matcher::new(config.strategies.clone());
        Self {
            config,
            source,
            store,
            matcher,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancel: CancelToken::new(),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The device contact source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The remote contact store.
    pub fn store(&self) -> &R {
        &self.store
    }

    /// A handle that cancels the current run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Cancels the ongoing run, if any.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Full bidirectional sync.
    pub fn sync(&self) -> SyncResult<SyncReport> {
        self.run(SyncMode::Full)
    }

    /// Imports device contacts that have no remote counterpart.
    pub fn quick_import(&self) -> SyncResult<SyncReport> {
        self.run(SyncMode::QuickImport)
    }

    /// Propagates remote values to the device without scanning for new
    /// device contacts.
    pub fn push_only(&self) -> SyncResult<SyncReport> {
        self.run(SyncMode::PushOnly)
    }

    /// Re-establishes links without creating or pushing anything.
    pub fn repair_links(&self) -> SyncResult<SyncReport> {
        self.run(SyncMode::Repair)
    }

    /// Executes one run in `mode`.
    ///
    /// Returns `Err` only if another run is in progress. Aborted runs return
    /// a report carrying the single aborting error.
    pub fn run(&self, mode: SyncMode) -> SyncResult<SyncReport> {
        self.begin()?;
        self.cancel.reset();

        let start = Instant::now();
        let mut report = SyncReport::new(mode);
        info!(%mode, "contact sync started");

        let outcome = self.execute(mode, &mut report);

        self.set_state(SyncState::Reporting);
        report.duration = start.elapsed();

        let final_state = match outcome {
            Ok(()) => SyncState::Done,
            Err(SyncError::Cancelled) => {
                warn!(%mode, "contact sync cancelled; committed changes are kept");
                report.cancelled = true;
                SyncState::Done
            }
            Err(e) => {
                warn!(%mode, error = %e, "contact sync aborted");
                report.push_error(format!("sync aborted: {}", e));
                SyncState::Failed
            }
        };

        {
            let mut stats = self.stats.write();
            match final_state {
                SyncState::Failed => {
                    stats.runs_failed += 1;
                    stats.last_error = report.errors.last().cloned();
                }
                _ => {
                    stats.runs_completed += 1;
                    stats.last_error = None;
                    stats.record_errors += report.errors.len() as u64;
                }
            }
            stats.contacts_imported += report.imported;
            stats.contacts_synced_back += report.synced_back;
            stats.last_run_time = Some(Instant::now());
        }

        info!(
            %mode,
            imported = report.imported,
            linked = report.linked,
            updated = report.updated,
            created_on_device = report.created_on_device,
            synced_back = report.synced_back,
            errors = report.errors.len(),
            "contact sync finished"
        );
        self.set_state(final_state);
        Ok(report)
    }

    /// Classifies every remote contact against the device collection
    /// without writing anything.
    pub fn inspect(&self) -> SyncResult<Vec<(RemoteContact, Correspondence)>> {
        let permission = self.source.permission(&self.cancel)?;
        if let Some(err) = permission.to_error() {
            return Err(err);
        }
        let devices = ContactIndex::build(self.fetch_devices()?);
        let remotes = self.store.list_all(&self.cancel)?;

        Ok(remotes
            .into_iter()
            .map(|remote| {
                let correspondence = classify(&remote, &devices, &self.matcher);
                (remote, correspondence)
            })
            .collect())
    }

    fn begin(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start_sync() {
            return Err(SyncError::AlreadyRunning);
        }
        *state = SyncState::Fetching;
        Ok(())
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn execute(&self, mode: SyncMode, report: &mut SyncReport) -> SyncResult<()> {
        let cancel = &self.cancel;

        // Fetching
        let permission = self.source.permission(cancel)?;
        report.permission = Some(permission);
        if let Some(err) = permission.to_error() {
            return Err(err);
        }
        if permission == DevicePermission::Limited {
            warn!("device contact access is limited; only a subset of contacts is visible");
        }

        let devices = self.fetch_devices()?;
        let remotes = self.store.list_all(cancel)?;
        report.device_count = devices.len() as u64;
        report.remote_count = remotes.len() as u64;
        debug!(
            devices = devices.len(),
            remotes = remotes.len(),
            "collections fetched"
        );

        self.set_state(SyncState::Indexing);
        let mut ledger = RunLedger::default();
        if mode == SyncMode::Repair {
            ledger.dangling = self.find_dangling(&remotes, &devices)?;
        }

        let remotes = if mode.runs_device_to_remote() {
            let mut remote_index = ContactIndex::build(remotes);
            self.set_state(SyncState::DeviceToRemote);
            self.device_to_remote(mode, &devices, &mut remote_index, &mut ledger, report)?;

            if !mode.runs_remote_to_device() {
                return Ok(());
            }
            let refreshed = self.store.list_all(cancel)?;
            report.remote_count = refreshed.len() as u64;
            refreshed
        } else {
            remotes
        };

        self.set_state(SyncState::RemoteToDevice);
        self.remote_to_device(mode, &remotes, devices, &mut ledger, report)
    }

    /// Lists device contacts, falling back to per-record fetches when the
    /// bulk listing fails.
    fn fetch_devices(&self) -> SyncResult<Vec<DeviceContact>> {
        let cancel = &self.cancel;
        let bulk_error = match self.source.list_all(cancel) {
            Ok(contacts) => return Ok(contacts),
            Err(e) if e.aborts_run() || !self.config.list_fallback => return Err(e),
            Err(e) => e,
        };

        warn!(error = %bulk_error, "bulk device listing failed; fetching contacts one by one");
        let ids = self.source.list_ids(cancel).map_err(|fallback_error| {
            if fallback_error.aborts_run() {
                fallback_error
            } else {
                SyncError::Source(format!(
                    "device contacts unreadable ({}; fallback: {})",
                    bulk_error, fallback_error
                ))
            }
        })?;

        let mut contacts = Vec::with_capacity(ids.len());
        for id in ids {
            cancel.check()?;
            match self.source.get_by_id(&id, cancel) {
                Ok(Some(contact)) => contacts.push(contact),
                Ok(None) => debug!(%id, "device contact vanished during listing"),
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => warn!(%id, error = %e, "skipping unreadable device contact"),
            }
        }
        Ok(contacts)
    }

    /// Remote ids whose link resolves to no device contact.
    fn find_dangling(
        &self,
        remotes: &[RemoteContact],
        devices: &[DeviceContact],
    ) -> SyncResult<HashSet<String>> {
        let known: HashSet<&str> = devices.iter().filter_map(|d| d.device_id()).collect();
        let mut dangling = HashSet::new();

        for remote in remotes {
            let Some(link) = remote.device_link() else {
                continue;
            };
            if known.contains(link) {
                continue;
            }
            // A limited listing can hide linked contacts; ask directly.
            if self.source.get_by_id(link, &self.cancel)?.is_none() {
                debug!(remote = %remote.id, %link, "dangling device link");
                dangling.insert(remote.id.clone());
            }
        }
        Ok(dangling)
    }

    fn device_to_remote(
        &self,
        mode: SyncMode,
        devices: &[DeviceContact],
        remotes: &mut ContactIndex<RemoteContact>,
        ledger: &mut RunLedger,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        for device in devices {
            self.cancel.check()?;

            let name = device.name.trim();
            if name.is_empty() {
                continue;
            }
            if let Some(id) = device.device_id() {
                if remotes.contains_device(id) {
                    continue;
                }
            }

            let probe = MatchProbe::from_device(device);
            match self.matcher.resolve(&probe, remotes) {
                Some(found) if mode == SyncMode::QuickImport => {
                    debug!(
                        contact = name,
                        by = found.strategy.as_str(),
                        "already represented remotely"
                    );
                }
                Some(found) => {
                    let Some(remote) = remotes.get(found.position) else {
                        continue;
                    };
                    let remote_id = remote.id.clone();
                    let relinkable = !remote.is_linked() || ledger.dangling.contains(&remote_id);

                    if found.strategy == MatchStrategy::DeviceId || !relinkable {
                        debug!(
                            contact = name,
                            remote = %remote_id,
                            "remote counterpart already linked; keeping existing link"
                        );
                        continue;
                    }
                    let Some(device_id) = device.device_id() else {
                        debug!(contact = name, "device contact has no id; cannot link");
                        continue;
                    };

                    let patch = RemoteFields::link(device_id);
                    match self.with_retry(|| self.store.update(&remote_id, &patch, &self.cancel)) {
                        Ok(()) => {
                            remotes.update(found.position, |r| {
                                r.device_contact_id = Some(device_id.to_string())
                            });
                            ledger.dangling.remove(&remote_id);
                            ledger.linked_this_run.insert(remote_id.clone());
                            report.linked += 1;
                            debug!(
                                contact = name,
                                remote = %remote_id,
                                by = found.strategy.as_str(),
                                "linked remote contact"
                            );
                        }
                        Err(e) => self.record_failure(report, "link", name, e)?,
                    }
                }
                None if mode.creates() => {
                    let fields = device.to_remote_fields(self.config.import_stage.clone());
                    match self.with_retry(|| self.store.create(&fields, &self.cancel)) {
                        Ok(remote_id) => {
                            remotes.insert(RemoteContact::from_fields(remote_id.clone(), &fields));
                            ledger.linked_this_run.insert(remote_id.clone());
                            report.imported += 1;
                            debug!(contact = name, remote = %remote_id, "imported device contact");
                        }
                        Err(e) => self.record_failure(report, "import", name, e)?,
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    fn remote_to_device(
        &self,
        mode: SyncMode,
        remotes: &[RemoteContact],
        devices: Vec<DeviceContact>,
        ledger: &mut RunLedger,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let mut devices = ContactIndex::build(devices);
        let mut claimed: HashSet<String> = remotes
            .iter()
            .filter(|r| !ledger.dangling.contains(&r.id))
            .filter_map(|r| r.device_link().map(str::to_string))
            .collect();

        for remote in remotes {
            self.cancel.check()?;

            let name = remote.name.trim();
            if name.is_empty() {
                continue;
            }

            if let Some(link) = remote.device_link() {
                if !ledger.dangling.contains(&remote.id) {
                    self.push_linked(mode, remote, link, &mut devices, ledger, report)?;
                    continue;
                }
            }

            let probe = MatchProbe::from_remote(remote);
            let found = self.matcher.resolve_filtered(&probe, &devices, |d| {
                d.device_id().is_some_and(|id| !claimed.contains(id))
            });

            if let Some(found) = found {
                let Some(device_id) = devices
                    .get(found.position)
                    .and_then(|d| d.device_id())
                    .map(str::to_string)
                else {
                    continue;
                };
                let patch = RemoteFields::link(device_id.clone());
                match self.with_retry(|| self.store.update(&remote.id, &patch, &self.cancel)) {
                    Ok(()) => {
                        claimed.insert(device_id.clone());
                        ledger.dangling.remove(&remote.id);
                        report.linked += 1;
                        report.synced_back += 1;
                        debug!(
                            contact = name,
                            device = %device_id,
                            by = found.strategy.as_str(),
                            "linked device contact"
                        );
                    }
                    Err(e) => self.record_failure(report, "link", name, e)?,
                }
                continue;
            }

            if !mode.creates() {
                continue;
            }

            let fields = remote.to_device_fields();
            let device_id = match self.with_retry(|| self.source.create(&fields, &self.cancel)) {
                Ok(id) => id,
                Err(e) => {
                    self.record_failure(report, "create device contact for", name, e)?;
                    continue;
                }
            };
            devices.insert(DeviceContact::from_fields(device_id.clone(), &fields));
            claimed.insert(device_id.clone());
            report.created_on_device += 1;
            report.synced_back += 1;
            debug!(contact = name, device = %device_id, "created device contact");

            let patch = RemoteFields::link(device_id);
            match self.with_retry(|| self.store.update(&remote.id, &patch, &self.cancel)) {
                Ok(()) => report.linked += 1,
                Err(e) => self.record_failure(report, "link new device contact for", name, e)?,
            }
        }
        Ok(())
    }

    /// Pushes a linked remote contact's values onto its device contact.
    fn push_linked(
        &self,
        mode: SyncMode,
        remote: &RemoteContact,
        link: &str,
        devices: &mut ContactIndex<DeviceContact>,
        ledger: &RunLedger,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let name = remote.name.trim();
        let position = match devices.position_by_device(link) {
            Some(position) => Some(position),
            None => match self.source.get_by_id(link, &self.cancel) {
                Ok(Some(device)) => Some(devices.insert(device)),
                Ok(None) => None,
                Err(e) => return self.record_failure(report, "read linked device contact for", name, e),
            },
        };
        let Some(position) = position else {
            report.stale_links += 1;
            debug!(contact = name, %link, "device link resolves to no contact");
            return Ok(());
        };

        // Fresh links count once whether or not a field push follows.
        let fresh = ledger.linked_this_run.contains(&remote.id);
        if fresh {
            report.synced_back += 1;
        }
        if !mode.pushes_fields() {
            return Ok(());
        }

        let Some(device) = devices.get(position) else {
            return Ok(());
        };
        let patch = remote.overwrite_patch(device);
        if patch.is_empty() {
            return Ok(());
        }

        match self.with_retry(|| self.source.update(link, &patch, &self.cancel)) {
            Ok(()) => {
                debug!(contact = name, fields = ?patch.field_names(), "pushed remote values to device");
                devices.update(position, |d| d.apply(&patch));
                report.updated += 1;
                if !fresh {
                    report.synced_back += 1;
                }
                Ok(())
            }
            Err(e) => self.record_failure(report, "push", name, e),
        }
    }

    /// Records a per-record failure, or propagates it if it must stop the run.
    fn record_failure(
        &self,
        report: &mut SyncReport,
        action: &str,
        name: &str,
        error: SyncError,
    ) -> SyncResult<()> {
        if error.aborts_run() {
            return Err(error);
        }
        warn!(contact = name, error = %error, "{} failed", action);
        report.push_error(format!("{} '{}': {}", action, name, error));
        Ok(())
    }

    /// Runs a per-record write, retrying transient failures per the config.
    fn with_retry<T>(&self, mut op: impl FnMut() -> SyncResult<T>) -> SyncResult<T> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    debug!(error = %e, attempt, ?delay, "retrying contact write");
                    std::thread::sleep(delay);
                    self.cancel.check()?;
                    self.stats.write().retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::memory::{MemoryContactSource, MemoryContactStore};
    use crate::store::ContactStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use synchro_model::PipelineStage;

    fn engine(
        devices: Vec<DeviceContact>,
        remotes: Vec<RemoteContact>,
    ) -> SyncEngine<MemoryContactSource, MemoryContactStore> {
        SyncEngine::new(
            SyncConfig::new("memory://"),
            MemoryContactSource::with_contacts(devices),
            MemoryContactStore::with_contacts(remotes),
        )
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Idle.can_start_sync());
        assert!(SyncState::Done.can_start_sync());
        assert!(SyncState::Failed.can_start_sync());
        assert!(!SyncState::Fetching.can_start_sync());
        assert!(!SyncState::DeviceToRemote.can_start_sync());
        assert!(SyncState::RemoteToDevice.is_active());
        assert!(!SyncState::Done.is_active());
    }

    #[test]
    fn engine_initial_state() {
        let engine = engine(vec![], vec![]);
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().runs_completed, 0);
    }

    #[test]
    fn empty_sync() {
        let engine = engine(vec![], vec![]);
        let report = engine.sync().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.imported, 0);
        assert_eq!(report.synced_back, 0);
        assert_eq!(engine.state(), SyncState::Done);
        assert_eq!(engine.stats().runs_completed, 1);
    }

    #[test]
    fn concurrent_run_is_refused() {
        let engine = engine(vec![], vec![]);
        engine.set_state(SyncState::DeviceToRemote);
        assert!(matches!(engine.sync(), Err(SyncError::AlreadyRunning)));
    }

    #[test]
    fn denied_permission_aborts_with_single_error() {
        let engine = engine(
            vec![DeviceContact::new("Ana Silva").with_id("d1")],
            vec![],
        );
        engine.source().set_permission(DevicePermission::Denied);

        let report = engine.sync().unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("permission denied"));
        assert_eq!(report.imported, 0);
        assert_eq!(report.permission, Some(DevicePermission::Denied));
        assert!(engine.store().is_empty());
        assert_eq!(engine.state(), SyncState::Failed);
        assert_eq!(engine.stats().runs_failed, 1);
    }

    #[test]
    fn limited_permission_still_syncs() {
        let engine = engine(vec![DeviceContact::new("Ana Silva").with_id("d1")], vec![]);
        engine.source().set_permission(DevicePermission::Limited);

        let report = engine.sync().unwrap();
        assert!(report.is_clean());
        assert!(report.needs_full_access());
        assert_eq!(report.imported, 1);
    }

    #[test]
    fn nameless_device_contacts_are_skipped() {
        let engine = engine(
            vec![DeviceContact::new("   ").with_id("d1").with_phone("5550001111")],
            vec![],
        );
        let report = engine.sync().unwrap();
        assert_eq!(report.imported, 0);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn import_uses_configured_stage() {
        let engine = SyncEngine::new(
            SyncConfig::new("memory://").with_import_stage(PipelineStage::Quarterly),
            MemoryContactSource::with_contacts(vec![DeviceContact::new("Ana").with_id("d1")]),
            MemoryContactStore::new(),
        );
        engine.quick_import().unwrap();
        assert_eq!(
            engine.store().contacts()[0].pipeline_stage,
            PipelineStage::Quarterly
        );
    }

    #[test]
    fn quick_import_skips_represented_contacts_without_linking() {
        let engine = engine(
            vec![
                DeviceContact::new("Ben Lee").with_id("d-ben").with_email("ben@x.com"),
                DeviceContact::new("Cara Diaz").with_id("d-cara"),
            ],
            vec![RemoteContact::new("r-ben", "Benjamin Lee").with_email("BEN@x.com")],
        );

        let report = engine.quick_import().unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.linked, 0);
        assert_eq!(report.synced_back, 0);
        assert!(!engine.store().get("r-ben").unwrap().is_linked());
        assert_eq!(engine.store().len(), 2);
        assert_eq!(engine.source().write_count(), 0);
    }

    #[test]
    fn push_only_overwrites_changed_fields() {
        let engine = engine(
            vec![DeviceContact::new("Ana Silva")
                .with_id("d1")
                .with_phone("555 000 1111")
                .with_note("old note")],
            vec![RemoteContact::new("r1", "Ana Silva")
                .with_phone("+1 555 000 1111")
                .with_notes("new note")
                .with_device_link("d1")],
        );

        let report = engine.push_only().unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.synced_back, 1);
        let device = &engine.source().contacts()[0];
        assert_eq!(device.note.as_deref(), Some("new note"));
        assert_eq!(device.phones, vec!["555 000 1111".to_string()]);

        let again = engine.push_only().unwrap();
        assert_eq!(again.updated, 0);
        assert_eq!(again.synced_back, 0);
    }

    #[test]
    fn push_only_does_not_import() {
        let engine = engine(vec![DeviceContact::new("Solo").with_id("d1")], vec![]);
        let report = engine.push_only().unwrap();
        assert_eq!(report.imported, 0);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn link_from_remote_pass_waits_for_next_push() {
        let engine = engine(
            vec![DeviceContact::new("Ben Lee").with_id("d-ben").with_email("ben@x.com")],
            vec![RemoteContact::new("r-ben", "Ben Lee")
                .with_email("ben@x.com")
                .with_notes("likes tea")],
        );

        let report = engine.push_only().unwrap();
        assert_eq!(report.linked, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.synced_back, 1);
        assert_eq!(engine.source().contacts()[0].note, None);

        let next = engine.push_only().unwrap();
        assert_eq!(next.updated, 1);
        assert_eq!(
            engine.source().contacts()[0].note.as_deref(),
            Some("likes tea")
        );
    }

    #[test]
    fn stale_link_is_left_alone_in_full_sync() {
        let engine = engine(
            vec![DeviceContact::new("Dana").with_id("d-new").with_phone("5553334444")],
            vec![RemoteContact::new("r1", "Dana")
                .with_phone("555-333-4444")
                .with_device_link("d-old")],
        );

        let report = engine.sync().unwrap();
        assert_eq!(report.stale_links, 1);
        assert_eq!(report.imported, 0);
        assert_eq!(report.created_on_device, 0);
        assert_eq!(engine.store().get("r1").unwrap().device_link(), Some("d-old"));
    }

    #[test]
    fn repair_relinks_dangling_links_without_creating() {
        let engine = engine(
            vec![
                DeviceContact::new("Dana").with_id("d-new").with_phone("5553334444"),
                DeviceContact::new("Unmatched").with_id("d-x"),
            ],
            vec![
                RemoteContact::new("r1", "Dana")
                    .with_phone("555-333-4444")
                    .with_device_link("d-old"),
                RemoteContact::new("r2", "Remote Only").with_email("ro@example.com"),
            ],
        );

        let report = engine.repair_links().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.linked, 1);
        assert_eq!(report.imported, 0);
        assert_eq!(report.created_on_device, 0);
        assert_eq!(engine.store().get("r1").unwrap().device_link(), Some("d-new"));
        assert!(!engine.store().get("r2").unwrap().is_linked());
        assert_eq!(engine.store().len(), 2);
        assert_eq!(engine.source().len(), 2);
        assert_eq!(engine.source().write_count(), 0);
    }

    #[test]
    fn per_record_failures_do_not_abort_the_batch() {
        let engine = engine(
            vec![
                DeviceContact::new("Broken").with_id("d1"),
                DeviceContact::new("Fine").with_id("d2"),
            ],
            vec![],
        );
        engine.store().fail_writes_for("Broken");

        let report = engine.sync().unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("import 'Broken'"));
        assert_eq!(engine.state(), SyncState::Done);
        assert_eq!(engine.stats().record_errors, 1);
    }

    #[test]
    fn device_side_failures_are_isolated() {
        let engine = engine(
            vec![],
            vec![
                RemoteContact::new("r1", "Cannot Create").with_phone("5551110000"),
                RemoteContact::new("r2", "Can Create").with_phone("5552220000"),
            ],
        );
        engine.source().fail_writes_for("Cannot Create");

        let report = engine.sync().unwrap();
        assert_eq!(report.created_on_device, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Cannot Create"));
        assert!(!engine.store().get("r1").unwrap().is_linked());
        assert!(engine.store().get("r2").unwrap().is_linked());
    }

    #[test]
    fn listing_fallback_reads_records_one_by_one() {
        let engine = engine(vec![DeviceContact::new("Ana").with_id("d1")], vec![]);
        engine.source().set_fail_listing(true);

        let report = engine.sync().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.device_count, 1);
        assert_eq!(report.imported, 1);
    }

    #[test]
    fn unreadable_device_collection_aborts() {
        let engine = engine(vec![DeviceContact::new("Ana").with_id("d1")], vec![]);
        engine.source().set_fail_listing(true);
        engine.source().set_list_ids_supported(false);

        let report = engine.sync().unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("device contacts unreadable"));
        assert!(engine.store().is_empty());
        assert_eq!(engine.state(), SyncState::Failed);
    }

    #[test]
    fn unreadable_remote_collection_aborts() {
        let engine = engine(vec![DeviceContact::new("Ana").with_id("d1")], vec![]);
        engine.store().set_fail_listing(true);

        let report = engine.sync().unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.imported, 0);
        assert_eq!(engine.state(), SyncState::Failed);
    }

    /// A store whose first `failures` writes fail transiently.
    struct FlakyStore {
        inner: MemoryContactStore,
        failures: AtomicU32,
    }

    impl ContactStore for FlakyStore {
        fn list_all(&self, cancel: &CancelToken) -> SyncResult<Vec<RemoteContact>> {
            self.inner.list_all(cancel)
        }

        fn create(&self, fields: &RemoteFields, cancel: &CancelToken) -> SyncResult<String> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(SyncError::transport_retryable("connection reset"));
            }
            self.inner.create(fields, cancel)
        }

        fn update(&self, id: &str, fields: &RemoteFields, cancel: &CancelToken) -> SyncResult<()> {
            self.inner.update(id, fields, cancel)
        }

        fn get_by_id(&self, id: &str, cancel: &CancelToken) -> SyncResult<Option<RemoteContact>> {
            self.inner.get_by_id(id, cancel)
        }
    }

    #[test]
    fn transient_write_failures_are_retried_when_configured() {
        let retry = RetryConfig::new(3).with_initial_delay(Duration::from_millis(1));
        let engine = SyncEngine::new(
            SyncConfig::new("memory://").with_retry(retry),
            MemoryContactSource::with_contacts(vec![DeviceContact::new("Ana").with_id("d1")]),
            FlakyStore {
                inner: MemoryContactStore::new(),
                failures: AtomicU32::new(2),
            },
        );

        let report = engine.quick_import().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.imported, 1);
        assert_eq!(engine.stats().retries, 2);
    }

    #[test]
    fn no_retry_by_default() {
        let engine = SyncEngine::new(
            SyncConfig::new("memory://"),
            MemoryContactSource::with_contacts(vec![DeviceContact::new("Ana").with_id("d1")]),
            FlakyStore {
                inner: MemoryContactStore::new(),
                failures: AtomicU32::new(1),
            },
        );

        let report = engine.quick_import().unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(report.errors.len(), 1);
    }

    /// A source that cancels the run once the first contact is created.
    struct CancellingSource {
        inner: MemoryContactSource,
        token: RwLock<Option<CancelToken>>,
    }

    impl ContactSource for CancellingSource {
        fn permission(&self, cancel: &CancelToken) -> SyncResult<DevicePermission> {
            self.inner.permission(cancel)
        }

        fn list_all(&self, cancel: &CancelToken) -> SyncResult<Vec<DeviceContact>> {
            self.inner.list_all(cancel)
        }

        fn create(
            &self,
            fields: &synchro_model::DeviceFields,
            cancel: &CancelToken,
        ) -> SyncResult<String> {
            let id = self.inner.create(fields, cancel)?;
            if let Some(token) = self.token.read().as_ref() {
                token.cancel();
            }
            Ok(id)
        }

        fn update(
            &self,
            id: &str,
            fields: &synchro_model::DeviceFields,
            cancel: &CancelToken,
        ) -> SyncResult<()> {
            self.inner.update(id, fields, cancel)
        }

        fn get_by_id(&self, id: &str, cancel: &CancelToken) -> SyncResult<Option<DeviceContact>> {
            self.inner.get_by_id(id, cancel)
        }
    }

    #[test]
    fn cancellation_keeps_committed_work() {
        let engine = SyncEngine::new(
            SyncConfig::new("memory://"),
            CancellingSource {
                inner: MemoryContactSource::new(),
                token: RwLock::new(None),
            },
            MemoryContactStore::with_contacts(vec![
                RemoteContact::new("r1", "First").with_phone("5551110000"),
                RemoteContact::new("r2", "Second").with_phone("5552220000"),
            ]),
        );
        *engine.source().token.write() = Some(engine.cancel_token());

        let report = engine.push_only().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.created_on_device, 1);
        assert_eq!(engine.source().inner.len(), 1);
        assert_eq!(engine.state(), SyncState::Done);

        // A re-run resumes: only the second contact is left to create.
        *engine.source().token.write() = None;
        let resumed = engine.push_only().unwrap();
        assert!(!resumed.cancelled);
        assert_eq!(resumed.created_on_device, 1);
        assert_eq!(engine.source().inner.len(), 2);
    }

    #[test]
    fn inspect_reports_correspondence() {
        let engine = engine(
            vec![DeviceContact::new("Ben Lee").with_id("d-ben").with_email("ben@x.com")],
            vec![
                RemoteContact::new("r1", "Ben Lee").with_email("ben@x.com"),
                RemoteContact::new("r2", "Nobody"),
            ],
        );
        let rows = engine.inspect().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1.label(), "matched");
        assert_eq!(rows[1].1, Correspondence::UnlinkedUnmatched);
        assert_eq!(engine.store().write_count(), 0);
    }
}
