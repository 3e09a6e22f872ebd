//! CLI command implementations.

pub mod inspect;
pub mod normalize;
pub mod sync;

use crate::client::ReqwestClient;
use synchro_engine::{HttpContactStore, SyncConfig};

/// The remote store every command talks to.
pub type RemoteStore = HttpContactStore<ReqwestClient>;

/// Connects to the CRM named in `config`.
pub fn connect(config: &SyncConfig) -> Result<RemoteStore, Box<dyn std::error::Error>> {
    if config.server_url.is_empty() {
        return Err("server URL required (--server or SYNCHRO_SERVER_URL)".into());
    }
    let client = ReqwestClient::new(config.timeout)?;
    Ok(HttpContactStore::from_config(config, client))
}
