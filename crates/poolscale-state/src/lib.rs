//! poolscale-state — embedded state store for poolscale.
//!
//! Backed by [redb](https://docs.rs/redb), holds the two pieces of state
//! the autoscaler reads but never derives itself:
//!
//! - autoscaler pause flags, toggled by operators, keyed by
//!   `{cluster}.{pool}.{scheduler}`;
//! - timestamped metadata metrics (capacity and resource totals) that
//!   seed the cold-start target computation.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
