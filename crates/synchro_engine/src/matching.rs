//! Matching engine.
//!
//! Decides which record in one collection refers to the same person as a
//! record in the other. Lookup tables are built explicitly per run from one
//! collection ([`ContactIndex`]); a [`Matcher`] then tries an ordered list of
//! [`MatchStrategy`] values and the first hit wins:
//!
//! 1. device identifier (authoritative)
//! 2. normalized phone
//! 3. normalized email
//! 4. normalized name (weakest, names are not unique)

use std::collections::HashMap;
use synchro_model::{
    normalize_email, normalize_name, normalize_phone, DeviceContact, RemoteContact,
};

/// One way of identifying the counterpart of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStrategy {
    /// Exact device identifier (remote device link ↔ device id).
    DeviceId,
    /// Normalized phone key.
    Phone,
    /// Normalized email key.
    Email,
    /// Normalized name key.
    Name,
}

impl MatchStrategy {
    /// Precision-first order used unless configured otherwise.
    pub const DEFAULT_ORDER: [MatchStrategy; 4] = [
        MatchStrategy::DeviceId,
        MatchStrategy::Phone,
        MatchStrategy::Email,
        MatchStrategy::Name,
    ];

    /// Short name for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::DeviceId => "device-id",
            MatchStrategy::Phone => "phone",
            MatchStrategy::Email => "email",
            MatchStrategy::Name => "name",
        }
    }

    fn lookup<T, F>(&self, probe: &MatchProbe, index: &ContactIndex<T>, accept: &F) -> Option<usize>
    where
        T: Indexable,
        F: Fn(&T) -> bool,
    {
        match self {
            MatchStrategy::DeviceId => probe
                .device_id
                .as_deref()
                .and_then(|id| index.first_accepted(&index.by_device, id, accept)),
            MatchStrategy::Phone => probe
                .phone_keys
                .iter()
                .find_map(|key| index.first_accepted(&index.by_phone, key, accept)),
            MatchStrategy::Email => probe
                .email_keys
                .iter()
                .find_map(|key| index.first_accepted(&index.by_email, key, accept)),
            MatchStrategy::Name => probe
                .name_key
                .as_deref()
                .and_then(|key| index.first_accepted(&index.by_name, key, accept)),
        }
    }
}

/// Supplies the identifying keys of a record.
pub trait Indexable {
    /// Device identifier key: the id of a device contact, or the device
    /// link of a remote contact.
    fn device_key(&self) -> Option<&str>;

    /// Normalized phone keys.
    fn phone_keys(&self) -> Vec<String>;

    /// Normalized email keys.
    fn email_keys(&self) -> Vec<String>;

    /// Normalized name key.
    fn name_key(&self) -> Option<String>;
}

impl Indexable for DeviceContact {
    fn device_key(&self) -> Option<&str> {
        self.device_id()
    }

    fn phone_keys(&self) -> Vec<String> {
        self.phones.iter().filter_map(|p| normalize_phone(p)).collect()
    }

    fn email_keys(&self) -> Vec<String> {
        self.emails.iter().filter_map(|e| normalize_email(e)).collect()
    }

    fn name_key(&self) -> Option<String> {
        normalize_name(&self.name)
    }
}

impl Indexable for RemoteContact {
    fn device_key(&self) -> Option<&str> {
        self.device_link()
    }

    fn phone_keys(&self) -> Vec<String> {
        self.phone.as_deref().and_then(normalize_phone).into_iter().collect()
    }

    fn email_keys(&self) -> Vec<String> {
        self.email.as_deref().and_then(normalize_email).into_iter().collect()
    }

    fn name_key(&self) -> Option<String> {
        normalize_name(&self.name)
    }
}

/// Lookup tables over one contact collection.
///
/// Each key maps to every entry carrying it, in insertion order, so the
/// earliest entry wins when several share a key.
#[derive(Debug, Clone)]
pub struct ContactIndex<T> {
    entries: Vec<T>,
    by_device: HashMap<String, Vec<usize>>,
    by_phone: HashMap<String, Vec<usize>>,
    by_email: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
}

impl<T: Indexable> ContactIndex<T> {
    /// Builds an index over `entries`.
    pub fn build(entries: Vec<T>) -> Self {
        let mut index = Self {
            entries: Vec::with_capacity(entries.len()),
            by_device: HashMap::new(),
            by_phone: HashMap::new(),
            by_email: HashMap::new(),
            by_name: HashMap::new(),
        };
        for entry in entries {
            index.insert(entry);
        }
        index
    }

    /// Adds a record and returns its position.
    pub fn insert(&mut self, entry: T) -> usize {
        let position = self.entries.len();
        self.entries.push(entry);
        self.add_keys(position);
        position
    }

    /// Mutates the record at `position` and re-indexes its keys.
    pub fn update<F>(&mut self, position: usize, f: F)
    where
        F: FnOnce(&mut T),
    {
        if position >= self.entries.len() {
            return;
        }
        self.remove_keys(position);
        f(&mut self.entries[position]);
        self.add_keys(position);
    }

    /// Returns the record at `position`.
    pub fn get(&self, position: usize) -> Option<&T> {
        self.entries.get(position)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the first record carrying this device key.
    pub fn position_by_device(&self, device_id: &str) -> Option<usize> {
        self.by_device
            .get(device_id)
            .and_then(|positions| positions.first().copied())
    }

    /// Returns true if some record carries this device key.
    pub fn contains_device(&self, device_id: &str) -> bool {
        self.position_by_device(device_id).is_some()
    }

    fn first_accepted<F>(
        &self,
        table: &HashMap<String, Vec<usize>>,
        key: &str,
        accept: &F,
    ) -> Option<usize>
    where
        F: Fn(&T) -> bool,
    {
        table
            .get(key)?
            .iter()
            .copied()
            .find(|&position| accept(&self.entries[position]))
    }

    fn add_keys(&mut self, position: usize) {
        let entry = &self.entries[position];
        let device = entry.device_key().map(str::to_string);
        let phones = entry.phone_keys();
        let emails = entry.email_keys();
        let name = entry.name_key();

        if let Some(key) = device {
            push_position(&mut self.by_device, key, position);
        }
        for key in phones {
            push_position(&mut self.by_phone, key, position);
        }
        for key in emails {
            push_position(&mut self.by_email, key, position);
        }
        if let Some(key) = name {
            push_position(&mut self.by_name, key, position);
        }
    }

    fn remove_keys(&mut self, position: usize) {
        let entry = &self.entries[position];
        let device = entry.device_key().map(str::to_string);
        let phones = entry.phone_keys();
        let emails = entry.email_keys();
        let name = entry.name_key();

        if let Some(key) = device {
            drop_position(&mut self.by_device, &key, position);
        }
        for key in phones {
            drop_position(&mut self.by_phone, &key, position);
        }
        for key in emails {
            drop_position(&mut self.by_email, &key, position);
        }
        if let Some(key) = name {
            drop_position(&mut self.by_name, &key, position);
        }
    }
}

fn push_position(table: &mut HashMap<String, Vec<usize>>, key: String, position: usize) {
    let positions = table.entry(key).or_default();
    // Kept sorted so re-indexed entries keep their original priority.
    if let Err(slot) = positions.binary_search(&position) {
        positions.insert(slot, position);
    }
}

fn drop_position(table: &mut HashMap<String, Vec<usize>>, key: &str, position: usize) {
    let Some(positions) = table.get_mut(key) else {
        return;
    };
    if let Ok(slot) = positions.binary_search(&position) {
        positions.remove(slot);
    }
    if positions.is_empty() {
        table.remove(key);
    }
}

/// The raw identifying fields of the contact being resolved, normalized once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchProbe {
    /// Declared device identifier, if any.
    pub device_id: Option<String>,
    /// Normalized phone keys, in priority order.
    pub phone_keys: Vec<String>,
    /// Normalized email keys, in priority order.
    pub email_keys: Vec<String>,
    /// Normalized name key.
    pub name_key: Option<String>,
}

impl MatchProbe {
    /// Builds a probe from raw fields.
    pub fn new<'a>(
        device_id: Option<&str>,
        phones: impl IntoIterator<Item = &'a str>,
        emails: impl IntoIterator<Item = &'a str>,
        name: &str,
    ) -> Self {
        Self {
            device_id: device_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            phone_keys: phones.into_iter().filter_map(normalize_phone).collect(),
            email_keys: emails.into_iter().filter_map(normalize_email).collect(),
            name_key: normalize_name(name),
        }
    }

    /// Probe for a device contact (its id is the declared device identifier).
    pub fn from_device(contact: &DeviceContact) -> Self {
        Self::new(
            contact.device_id(),
            contact.phones.iter().map(String::as_str),
            contact.emails.iter().map(String::as_str),
            &contact.name,
        )
    }

    /// Probe for a remote contact (its device link is the declared identifier).
    pub fn from_remote(contact: &RemoteContact) -> Self {
        Self::new(
            contact.device_link(),
            contact.phone.as_deref(),
            contact.email.as_deref(),
            &contact.name,
        )
    }
}

/// A resolved counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Position of the counterpart in the searched index.
    pub position: usize,
    /// The strategy that found it.
    pub strategy: MatchStrategy,
}

/// Resolves probes against an index using an ordered strategy list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    strategies: Vec<MatchStrategy>,
}

impl Matcher {
    /// Creates a matcher that tries `strategies` in order.
    pub fn new(strategies: Vec<MatchStrategy>) -> Self {
        Self { strategies }
    }

    /// The strategies, highest priority first.
    pub fn strategies(&self) -> &[MatchStrategy] {
        &self.strategies
    }

    /// Returns a matcher without the given strategy.
    pub fn without(&self, strategy: MatchStrategy) -> Self {
        Self {
            strategies: self
                .strategies
                .iter()
                .copied()
                .filter(|s| *s != strategy)
                .collect(),
        }
    }

    /// Returns the first counterpart found, trying strategies in order.
    pub fn resolve<T: Indexable>(&self, probe: &MatchProbe, index: &ContactIndex<T>) -> Option<Match> {
        self.resolve_filtered(probe, index, |_| true)
    }

    /// Like [`Matcher::resolve`], skipping candidates `accept` rejects.
    pub fn resolve_filtered<T, F>(
        &self,
        probe: &MatchProbe,
        index: &ContactIndex<T>,
        accept: F,
    ) -> Option<Match>
    where
        T: Indexable,
        F: Fn(&T) -> bool,
    {
        self.strategies.iter().find_map(|strategy| {
            strategy
                .lookup(probe, index, &accept)
                .map(|position| Match {
                    position,
                    strategy: *strategy,
                })
        })
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatchStrategy::DEFAULT_ORDER.to_vec())
    }
}

/// How a remote contact relates to the device collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correspondence {
    /// No device link and no device contact shares a key.
    UnlinkedUnmatched,
    /// No device link, but a device contact shares a key.
    UnlinkedMatched {
        /// Identifier of the matching device contact.
        device_id: Option<String>,
        /// The strategy that found it.
        strategy: MatchStrategy,
    },
    /// The device link resolves to an existing device contact.
    Linked {
        /// The linked device identifier.
        device_id: String,
    },
    /// The device link points at no existing device contact.
    Dangling {
        /// The stored device identifier.
        device_id: String,
    },
}

impl Correspondence {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Correspondence::UnlinkedUnmatched => "unlinked",
            Correspondence::UnlinkedMatched { .. } => "matched",
            Correspondence::Linked { .. } => "linked",
            Correspondence::Dangling { .. } => "dangling",
        }
    }
}

/// Classifies `remote` against an index of device contacts.
pub fn classify(
    remote: &RemoteContact,
    devices: &ContactIndex<DeviceContact>,
    matcher: &Matcher,
) -> Correspondence {
    if let Some(link) = remote.device_link() {
        return if devices.contains_device(link) {
            Correspondence::Linked {
                device_id: link.to_string(),
            }
        } else {
            Correspondence::Dangling {
                device_id: link.to_string(),
            }
        };
    }

    let probe = MatchProbe::from_remote(remote);
    match matcher.resolve(&probe, devices) {
        Some(found) => Correspondence::UnlinkedMatched {
            device_id: devices
                .get(found.position)
                .and_then(|d| d.device_id())
                .map(str::to_string),
            strategy: found.strategy,
        },
        None => Correspondence::UnlinkedUnmatched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remotes() -> ContactIndex<RemoteContact> {
        ContactIndex::build(vec![
            RemoteContact::new("r-phone", "Sam Porter").with_phone("(555) 123-4567"),
            RemoteContact::new("r-name", "Ana Silva"),
            RemoteContact::new("r-email", "A. Silva").with_email("ana@example.com"),
            RemoteContact::new("r-linked", "Cleo").with_device_link("dev-9"),
        ])
    }

    #[test]
    fn phone_beats_name() {
        let index = remotes();
        let device = DeviceContact::new("Ana Silva")
            .with_id("dev-1")
            .with_phone("+1 555 123 4567");

        let found = Matcher::default()
            .resolve(&MatchProbe::from_device(&device), &index)
            .unwrap();
        assert_eq!(found.strategy, MatchStrategy::Phone);
        assert_eq!(index.get(found.position).unwrap().id, "r-phone");
    }

    #[test]
    fn email_beats_name() {
        let index = remotes();
        let device = DeviceContact::new("Ana Silva").with_email("ANA@Example.com ");
        let found = Matcher::default()
            .resolve(&MatchProbe::from_device(&device), &index)
            .unwrap();
        assert_eq!(found.strategy, MatchStrategy::Email);
        assert_eq!(index.get(found.position).unwrap().id, "r-email");
    }

    #[test]
    fn name_is_the_last_resort() {
        let index = remotes();
        let device = DeviceContact::new("  ana SILVA").with_phone("555 999 0000");
        let found = Matcher::default()
            .resolve(&MatchProbe::from_device(&device), &index)
            .unwrap();
        assert_eq!(found.strategy, MatchStrategy::Name);
        assert_eq!(index.get(found.position).unwrap().id, "r-name");
    }

    #[test]
    fn device_id_is_authoritative() {
        let index = remotes();
        let device = DeviceContact::new("Sam Porter")
            .with_id("dev-9")
            .with_phone("5551234567");
        let found = Matcher::default()
            .resolve(&MatchProbe::from_device(&device), &index)
            .unwrap();
        assert_eq!(found.strategy, MatchStrategy::DeviceId);
        assert_eq!(index.get(found.position).unwrap().id, "r-linked");
    }

    #[test]
    fn no_match() {
        let index = remotes();
        let device = DeviceContact::new("Nobody").with_phone("555 000 9999");
        assert_eq!(
            Matcher::default().resolve(&MatchProbe::from_device(&device), &index),
            None
        );
    }

    #[test]
    fn strategy_order_is_configurable() {
        let index = remotes();
        let device = DeviceContact::new("Ana Silva").with_phone("5551234567");
        let matcher = Matcher::new(vec![MatchStrategy::Name, MatchStrategy::Phone]);
        let found = matcher
            .resolve(&MatchProbe::from_device(&device), &index)
            .unwrap();
        assert_eq!(found.strategy, MatchStrategy::Name);

        let matcher = Matcher::default().without(MatchStrategy::Name);
        let lonely = DeviceContact::new("Ana Silva");
        assert_eq!(matcher.resolve(&MatchProbe::from_device(&lonely), &index), None);
    }

    #[test]
    fn earliest_entry_wins_a_shared_key() {
        let index = ContactIndex::build(vec![
            RemoteContact::new("first", "Jo").with_phone("555-111-2222"),
            RemoteContact::new("second", "Joanne").with_phone("5551112222"),
        ]);
        let probe = MatchProbe::new(None, ["+1 555 111 2222"], [], "");
        let found = Matcher::default().resolve(&probe, &index).unwrap();
        assert_eq!(index.get(found.position).unwrap().id, "first");

        let found = Matcher::default()
            .resolve_filtered(&probe, &index, |r| r.id != "first")
            .unwrap();
        assert_eq!(index.get(found.position).unwrap().id, "second");
    }

    #[test]
    fn inserted_and_updated_entries_are_indexed() {
        let mut index = remotes();
        let position = index.insert(RemoteContact::new("r-new", "Dee").with_phone("555 777 8888"));
        let probe = MatchProbe::new(None, ["5557778888"], [], "");
        assert_eq!(
            Matcher::default().resolve(&probe, &index).map(|m| m.position),
            Some(position)
        );

        assert!(!index.contains_device("dev-42"));
        index.update(position, |r| r.device_contact_id = Some("dev-42".into()));
        assert_eq!(index.position_by_device("dev-42"), Some(position));
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn update_drops_only_the_entrys_old_keys() {
        let mut index = ContactIndex::build(vec![
            RemoteContact::new("r1", "Kim").with_phone("5550001111"),
            RemoteContact::new("r2", "Kim").with_phone("5550002222"),
        ]);
        index.update(0, |r| r.phone = Some("5559998888".into()));

        let matcher = Matcher::default();
        let old_phone = MatchProbe::new(None, ["5550001111"], [], "");
        assert_eq!(matcher.resolve(&old_phone, &index), None);

        let new_phone = MatchProbe::new(None, ["5559998888"], [], "");
        assert_eq!(matcher.resolve(&new_phone, &index).map(|m| m.position), Some(0));

        // The shared name bucket keeps both entries in their original order.
        let by_name = MatchProbe::new(None, [], [], "kim");
        assert_eq!(matcher.resolve(&by_name, &index).map(|m| m.position), Some(0));
        let others = matcher.resolve_filtered(&by_name, &index, |r| r.id != "r1");
        assert_eq!(others.map(|m| m.position), Some(1));
    }

    #[test]
    fn classify_correspondence() {
        let devices = ContactIndex::build(vec![
            DeviceContact::new("Ben Lee").with_id("dev-ben").with_email("ben@x.com"),
            DeviceContact::new("Cleo").with_id("dev-9"),
        ]);
        let matcher = Matcher::default();

        let ben = RemoteContact::new("r1", "Ben Lee").with_email("BEN@x.com");
        assert_eq!(
            classify(&ben, &devices, &matcher),
            Correspondence::UnlinkedMatched {
                device_id: Some("dev-ben".into()),
                strategy: MatchStrategy::Email,
            }
        );

        let cleo = RemoteContact::new("r2", "Cleo").with_device_link("dev-9");
        assert_eq!(
            classify(&cleo, &devices, &matcher),
            Correspondence::Linked {
                device_id: "dev-9".into()
            }
        );

        let gone = RemoteContact::new("r3", "Gone").with_device_link("dev-old");
        assert_eq!(classify(&gone, &devices, &matcher).label(), "dangling");

        let stranger = RemoteContact::new("r4", "Stranger");
        assert_eq!(
            classify(&stranger, &devices, &matcher),
            Correspondence::UnlinkedUnmatched
        );
    }
}
