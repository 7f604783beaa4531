//! Data model types for wpsync.
//!
//! These types represent the core domain entities:
//! - [`Environment`] - A deployment target and how to reach it
//! - [`Route`] - A named synchronization direction with its URL mappings
//! - [`Snapshot`] - A database dump file on some environment's filesystem

pub mod environment;
pub mod route;
pub mod snapshot;

pub use environment::{domain_of, join_path, Access, DatabaseEngine, Environment};
pub use route::{standard_routes, Route, UrlMapping, STANDARD_ROUTES};
pub use snapshot::{backup_file_name, parse_backup_name, stamp, Snapshot, SnapshotKind};
