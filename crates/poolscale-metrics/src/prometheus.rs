//! Prometheus text exposition format.
//!
//! Renders a registry snapshot into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::collections::BTreeSet;

use crate::registry::{Dimensions, MetricsSnapshot};

/// Prometheus metric names cannot contain dots.
fn metric_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn labels(dims: &Dimensions) -> String {
    if dims.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = dims
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", metric_name(k), v.replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

/// Render every gauge and counter in `snapshot`.
///
/// Series are grouped under one `# TYPE` line per metric name.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    let gauge_names: BTreeSet<&String> = snapshot.gauges.keys().map(|(n, _)| n).collect();
    for name in gauge_names {
        let prom = metric_name(name);
        out.push_str(&format!("# TYPE {prom} gauge\n"));
        for ((_, dims), value) in snapshot.gauges.iter().filter(|((n, _), _)| n == name) {
            out.push_str(&format!("{prom}{} {value}\n", labels(dims)));
        }
    }

    let counter_names: BTreeSet<&String> = snapshot.counters.keys().map(|(n, _)| n).collect();
    for name in counter_names {
        let prom = format!("{}_total", metric_name(name));
        out.push_str(&format!("# TYPE {prom} counter\n"));
        for ((_, dims), value) in snapshot.counters.iter().filter(|((n, _), _)| n == name) {
            out.push_str(&format!("{prom}{} {value}\n", labels(dims)));
        }
    }

    out
}
