use std::path::Path;

use poolscale_autoscale::history::HISTORY_WINDOW_SECS;
use poolscale_autoscale::smoothed_non_zero;
use poolscale_state::{MetadataPoint, StateStore};
use tracing::info;

use super::{PoolArgs, epoch_secs, open_state};

/// Query window; unset bounds default to the week before now.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub smoothing: usize,
}

pub fn history(
    state: &Path,
    pool: &PoolArgs,
    metric: &str,
    window: Window,
    format: &str,
) -> anyhow::Result<()> {
    let store = open_state(state)?;
    println!("{}", render(&store, pool, metric, window, epoch_secs(), format)?);
    Ok(())
}

/// Drop metadata older than `before`, by default the start of the
/// cold-start window.
pub fn prune(state: &Path, before: Option<u64>) -> anyhow::Result<()> {
    let store = open_state(state)?;
    let before = before.unwrap_or(epoch_secs().saturating_sub(HISTORY_WINDOW_SECS));
    let removed = store.prune_metadata(before)?;
    info!(before, removed, "pruned metadata history");
    println!("Removed {removed} points recorded before {before}.");
    Ok(())
}

pub fn render(
    store: &StateStore,
    pool: &PoolArgs,
    metric: &str,
    window: Window,
    now: u64,
    format: &str,
) -> anyhow::Result<String> {
    anyhow::ensure!(window.smoothing > 0, "--smoothing must be positive");
    let end = window.end.unwrap_or(now);
    let start = window.start.unwrap_or(end.saturating_sub(HISTORY_WINDOW_SECS));
    let key = pool.key();
    let points = store.metadata_values(metric, &key.dimensions(), start, end)?;
    let smoothed = smoothed_non_zero(&points, window.smoothing);

    Ok(match format {
        "json" => serde_json::to_string_pretty(&serde_json::json!({
            "pool": key.to_string(),
            "metric": metric,
            "start": start,
            "end": end,
            "points": points,
            "smoothed": smoothed.map(|(first, last, mean)| serde_json::json!({
                "start": first,
                "end": last,
                "value": mean,
            })),
        }))?,
        _ => render_text(metric, &points, smoothed, window.smoothing),
    })
}

fn render_text(
    metric: &str,
    points: &[MetadataPoint],
    smoothed: Option<(u64, u64, f64)>,
    smoothing: usize,
) -> String {
    let mut out = format!("{metric} ({} points)\n", points.len());
    for point in points {
        out.push_str(&format!("  {}  {}\n", point.timestamp, point.value));
    }
    match smoothed {
        Some((first, last, mean)) => out.push_str(&format!(
            "smoothed over last {smoothing} non-zero points: {mean} ({first}..{last})"
        )),
        None => out.push_str("no non-zero points"),
    }
    out
}
