//! Core data models for the bucket manager.
//!
//! These types describe what the web UI sees (projected entries, upload
//! tasks) and what the remote store hands back (raw listing pages). They
//! serialize naturally as JSON via `serde`.

pub mod entry;
pub mod identity;
pub mod upload;
