//! CLI command implementations

pub mod asset;
pub mod completions;
pub mod form;
pub mod init;
pub mod job;
pub mod meter;
pub mod sub;
pub mod validate;
