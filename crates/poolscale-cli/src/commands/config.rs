use std::path::Path;

use anyhow::Context;
use poolscale_autoscale::SignalSettings;
use poolscale_core::{DefaultsConfig, PoolConfig};
use poolscale_pool::parse_target_capacity;

use super::PoolArgs;

pub fn check_config(
    pool_config: &Path,
    defaults: Option<&Path>,
    pool: &PoolArgs,
    target: Option<&str>,
) -> anyhow::Result<()> {
    let config = PoolConfig::from_file(pool_config)
        .with_context(|| format!("loading {}", pool_config.display()))?;
    let defaults = defaults
        .map(|path| {
            DefaultsConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
        })
        .transpose()?;
    println!("{}", render(&config, defaults.as_ref(), pool, target)?);
    Ok(())
}

/// Resolve `config` and describe the result.
pub fn render(
    config: &PoolConfig,
    defaults: Option<&DefaultsConfig>,
    pool: &PoolArgs,
    target: Option<&str>,
) -> anyhow::Result<String> {
    let key = pool.key();
    let autoscaling = config.autoscaling_config(defaults)?;
    let limits = &config.scaling_limits;

    let mut out = format!("Configuration for {key} is valid.\n\n");
    out.push_str(&format!(
        "autoscaling: setpoint={} target_capacity_margin={} excluded_resources={:?}\n",
        autoscaling.setpoint, autoscaling.target_capacity_margin, autoscaling.excluded_resources
    ));
    out.push_str(&format!(
        "scaling_limits: min_capacity={} max_capacity={} max_tasks_to_kill={:?} max_weight_to_add={} max_weight_to_remove={}\n",
        limits.min_capacity,
        limits.max_capacity,
        limits.max_tasks_to_kill,
        limits.max_weight_to_add,
        limits.max_weight_to_remove
    ));
    out.push_str(&format!("draining_enabled: {}\n", config.draining_enabled));
    out.push_str(&format!("resource_groups: {}\n", config.resource_groups.len()));

    let signal_config = config
        .autoscale_signal
        .as_ref()
        .map(|s| (s, "pool"))
        .or_else(|| defaults.and_then(|d| d.autoscale_signal.as_ref()).map(|s| (s, "default")));
    match signal_config {
        Some((signal, source)) => {
            let settings = SignalSettings::from_config(signal, &key)?;
            out.push_str(&format!(
                "signal ({source}): {} every {} minutes, parameters {}\n",
                settings.name,
                settings.period_minutes,
                serde_json::to_string(&settings.parameters)?
            ));
        }
        None => out.push_str("signal: none configured\n"),
    }

    if let Some(target) = target {
        let resolved = parse_target_capacity(target, limits)?;
        out.push_str(&format!("target {target:?} resolves to {resolved}\n"));
    }
    Ok(out)
}
