//! Run modes and the per-run report.

use crate::source::DevicePermission;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which phases a run executes and which writes it may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Device → remote import and link, then remote → device push and create.
    Full,
    /// Import genuinely new device contacts only; no link writes.
    QuickImport,
    /// Remote → device only.
    PushOnly,
    /// Matching on both sides, link writes only.
    Repair,
}

impl SyncMode {
    /// Whether device → remote processing runs.
    pub fn runs_device_to_remote(&self) -> bool {
        matches!(self, SyncMode::Full | SyncMode::QuickImport | SyncMode::Repair)
    }

    /// Whether remote → device processing runs.
    pub fn runs_remote_to_device(&self) -> bool {
        matches!(self, SyncMode::Full | SyncMode::PushOnly | SyncMode::Repair)
    }

    /// Whether records may be created on either side.
    pub fn creates(&self) -> bool {
        !matches!(self, SyncMode::Repair)
    }

    /// Whether link fields may be written.
    pub fn links(&self) -> bool {
        !matches!(self, SyncMode::QuickImport)
    }

    /// Whether remote field values may be pushed onto device contacts.
    pub fn pushes_fields(&self) -> bool {
        matches!(self, SyncMode::Full | SyncMode::PushOnly)
    }

    /// Name used on the command line and in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::QuickImport => "import",
            SyncMode::PushOnly => "push",
            SyncMode::Repair => "repair",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncMode::Full),
            "import" | "quick-import" => Ok(SyncMode::QuickImport),
            "push" | "push-only" => Ok(SyncMode::PushOnly),
            "repair" | "link-only" => Ok(SyncMode::Repair),
            other => Err(format!("unknown sync mode '{}'", other)),
        }
    }
}

/// Outcome of one run.
///
/// Per-record failures land in `errors` and never fail the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Mode the run executed.
    pub mode: SyncMode,
    /// Remote contacts created from device contacts.
    pub imported: u64,
    /// Link fields written on remote contacts.
    pub linked: u64,
    /// Device contacts overwritten with remote values.
    pub updated: u64,
    /// Device contacts created from remote contacts.
    pub created_on_device: u64,
    /// Remote contacts propagated to the device (pushed, linked, or created).
    pub synced_back: u64,
    /// Remote links that point at no device contact.
    pub stale_links: u64,
    /// Device contacts read.
    pub device_count: u64,
    /// Remote contacts read (after device → remote processing).
    pub remote_count: u64,
    /// Device permission level observed, if the check ran.
    pub permission: Option<DevicePermission>,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
    /// Per-record diagnostics, in processing order.
    pub errors: Vec<String>,
    /// Wall-clock duration.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl SyncReport {
    /// An empty report for `mode`.
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            imported: 0,
            linked: 0,
            updated: 0,
            created_on_device: 0,
            synced_back: 0,
            stale_links: 0,
            device_count: 0,
            remote_count: 0,
            permission: None,
            cancelled: false,
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Returns true if the run finished without errors.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    /// Returns true if the caller should ask for full contact access.
    pub fn needs_full_access(&self) -> bool {
        self.permission == Some(DevicePermission::Limited)
    }

    /// Records a per-record failure.
    pub(crate) fn push_error(&mut self, message: String) {
        self.errors.push(message);
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
