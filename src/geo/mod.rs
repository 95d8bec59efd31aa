//! Geospatial indexing of issue locations

pub mod backfill;
pub mod geohash;

pub use backfill::{backfill, index_issue, insert_indexed, BackfillReport};
pub use geohash::{encode, position_for, DEFAULT_PRECISION};
