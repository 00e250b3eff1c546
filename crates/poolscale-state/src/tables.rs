//! redb table definitions for the poolscale state store.
//!
//! Both tables use `&str` keys and JSON-serialized `&[u8]` values.

use redb::TableDefinition;

/// Pause flags keyed by `{cluster}.{pool}.{scheduler}`.
pub const AUTOSCALER_PAUSED: TableDefinition<&str, &[u8]> =
    TableDefinition::new("autoscaler_paused");

/// Metadata metric points keyed by `{metric}|{dimensions}|{timestamp:020}`.
///
/// Zero-padding the timestamp makes lexicographic key order match time
/// order, so a window is a single range scan.
pub const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");
