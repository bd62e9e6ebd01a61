//! Read models built from committed events.
//!
//! Projections are rebuildable from the store, partitioned by tenant and
//! idempotent under at-least-once delivery.

pub mod rfq_directory;

pub use rfq_directory::{RfqDirectoryError, RfqDirectoryProjection, RfqSummary};
