//! Inspect command implementation.

use super::connect;
use crate::device_file::JsonFileSource;
use serde::Serialize;
use std::path::Path;
use synchro_engine::{Correspondence, SyncConfig, SyncEngine};
use synchro_model::RemoteContact;

/// How one remote contact relates to the device file.
#[derive(Debug, Serialize)]
pub struct InspectRow {
    /// Remote id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Correspondence label.
    pub state: &'static str,
    /// Device contact involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Matching strategy, for matched contacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<&'static str>,
}

impl InspectRow {
    fn new(remote: RemoteContact, correspondence: Correspondence) -> Self {
        let (device_id, matched_by) = match correspondence {
            Correspondence::UnlinkedUnmatched => (None, None),
            Correspondence::UnlinkedMatched {
                ref device_id,
                strategy,
            } => (device_id.clone(), Some(strategy.as_str())),
            Correspondence::Linked { ref device_id }
            | Correspondence::Dangling { ref device_id } => (Some(device_id.clone()), None),
        };
        Self {
            id: remote.id,
            name: remote.name,
            state: correspondence.label(),
            device_id,
            matched_by,
        }
    }
}

/// Runs the inspect command.
pub fn run(device: &Path, config: SyncConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = connect(&config)?;
    let source = JsonFileSource::open(device)?;
    let engine = SyncEngine::new(config, source, store);

    let rows: Vec<InspectRow> = engine
        .inspect()?
        .into_iter()
        .map(|(remote, correspondence)| InspectRow::new(remote, correspondence))
        .collect();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<10} {:<24} {:<28} DEVICE", "STATE", "REMOTE ID", "NAME");
    for row in &rows {
        let device = match (&row.device_id, row.matched_by) {
            (Some(id), Some(by)) => format!("{} (by {})", id, by),
            (Some(id), None) => id.clone(),
            (None, _) => "-".to_string(),
        };
        println!("{:<10} {:<24} {:<28} {}", row.state, row.id, row.name, device);
    }
    println!();
    println!("{} remote contacts", rows.len());
    Ok(())
}
