//! Bucket manager: a virtual folder view over a flat S3 key space, a
//! sequential upload queue, and the JSON API the web UI talks to.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

/// Separator the store uses to group keys into virtual folders.
pub const DEFAULT_DELIMITER: char = '/';
