use std::path::Path;

use anyhow::Context;
use poolscale_state::{PauseRecord, StateStore};
use tracing::info;

use super::{PoolArgs, epoch_secs, open_state};

pub fn pause(state: &Path, pool: &PoolArgs, until: Option<u64>) -> anyhow::Result<()> {
    let now = epoch_secs();
    if let Some(until) = until {
        anyhow::ensure!(until > now, "--until must be in the future (now is {now})");
    }
    let store = open_state(state)?;
    let key = pool.key();
    store
        .pause_autoscaler(&key.pause_key(), now, until)
        .with_context(|| format!("pausing autoscaler for {key}"))?;
    info!(pool = %key, ?until, "autoscaler paused");
    println!("{}", describe(&store, &key.pause_key(), now)?);
    Ok(())
}

pub fn resume(state: &Path, pool: &PoolArgs) -> anyhow::Result<()> {
    let store = open_state(state)?;
    let key = pool.key();
    if store.resume_autoscaler(&key.pause_key())? {
        info!(pool = %key, "autoscaler resumed");
        println!("Autoscaler resumed for {key}");
    } else {
        println!("Autoscaler was not paused for {key}");
    }
    Ok(())
}

pub fn status(state: &Path, pool: &PoolArgs) -> anyhow::Result<()> {
    let store = open_state(state)?;
    println!("{}", describe(&store, &pool.key().pause_key(), epoch_secs())?);
    Ok(())
}

/// One-line description of the pause flag for `key` at `now`.
pub fn describe(store: &StateStore, key: &str, now: u64) -> anyhow::Result<String> {
    Ok(match store.autoscaler_pause(key)? {
        None => format!("The autoscaler is running for {key}"),
        Some(record) => describe_record(key, &record, now),
    })
}

fn describe_record(key: &str, record: &PauseRecord, now: u64) -> String {
    match (record.is_active(now), record.expiration_timestamp) {
        (true, None) => format!("The autoscaler is paused for {key} (since {}, no expiry)", record.paused_at),
        (true, Some(until)) => format!(
            "The autoscaler is paused for {key} (since {}, until {until})",
            record.paused_at
        ),
        (false, _) => format!("The autoscaler is running for {key} (pause expired)"),
    }
}
