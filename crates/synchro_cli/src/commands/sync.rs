//! Sync command implementation.

use super::{connect, RemoteStore};
use crate::device_file::JsonFileSource;
use std::path::Path;
use synchro_engine::{
    ContactSource, NullContactSource, SyncConfig, SyncEngine, SyncMode, SyncReport, SyncState,
};
use tracing::{info, warn};

/// Runs the sync command.
pub fn run(
    device: Option<&Path>,
    config: SyncConfig,
    mode: SyncMode,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = connect(&config)?;
    match device {
        Some(path) => {
            info!("Syncing {:?} with {}", path, store.base_url());
            let source = JsonFileSource::open(path)?;
            execute(SyncEngine::new(config, source, store), mode, format)
        }
        None => {
            warn!("no device contact file given; the device directory is unavailable");
            execute(SyncEngine::new(config, NullContactSource, store), mode, format)
        }
    }
}

fn execute<S: ContactSource>(
    engine: SyncEngine<S, RemoteStore>,
    mode: SyncMode,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = engine.run(mode)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }

    if engine.state() == SyncState::Failed {
        let reason = report
            .errors
            .last()
            .cloned()
            .unwrap_or_else(|| "sync aborted".to_string());
        return Err(reason.into());
    }
    Ok(())
}

fn print_text(report: &SyncReport) {
    println!("Contact Sync ({})", report.mode);
    println!("=================");
    println!();
    println!("Contacts:");
    println!("  Device:            {}", report.device_count);
    println!("  Remote:            {}", report.remote_count);
    println!();
    println!("Changes:");
    println!("  Imported:          {}", report.imported);
    println!("  Linked:            {}", report.linked);
    println!("  Updated on device: {}", report.updated);
    println!("  Created on device: {}", report.created_on_device);
    println!("  Synced back:       {}", report.synced_back);
    if report.stale_links > 0 {
        println!("  Stale links:       {}", report.stale_links);
    }
    println!();
    println!("Duration: {} ms", report.duration.as_millis());

    if report.needs_full_access() {
        println!();
        println!("Only part of the address book was visible; grant full access to sync everything.");
    }
    if report.cancelled {
        println!();
        println!("Cancelled before all contacts were processed.");
    }
    if !report.errors.is_empty() {
        println!();
        println!("Errors ({}):", report.errors.len());
        for error in &report.errors {
            println!("  ✗ {}", error);
        }
    } else if !report.cancelled {
        println!();
        println!("✓ Sync complete");
    }
}
