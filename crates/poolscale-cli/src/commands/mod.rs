pub mod config;
pub mod history;
pub mod pause;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Args;
use poolscale_core::PoolKey;
use poolscale_state::StateStore;

/// Identifies one pool.
#[derive(Args, Clone, Debug)]
pub struct PoolArgs {
    #[arg(long)]
    pub cluster: String,
    #[arg(long)]
    pub pool: String,
    #[arg(long, default_value = "mesos")]
    pub scheduler: String,
}

impl PoolArgs {
    pub fn key(&self) -> PoolKey {
        PoolKey::new(&self.cluster, &self.pool, &self.scheduler)
    }
}

pub fn open_state(path: &Path) -> anyhow::Result<StateStore> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    Ok(StateStore::open(path)?)
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
