//! Core logic: listing projection, path navigation, the store gateway and
//! its S3 backend, connection validation and the upload queue.

pub mod gateway;
pub mod namespace;
pub mod orchestrator;
pub mod path;
pub mod s3;
pub mod session;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;
