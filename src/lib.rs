//! FCT: Field Compliance Toolkit
//!
//! Capture inspection readings against versioned forms, evaluate them
//! against pass/fail bands, and lock submitted records for audit.

pub mod catalog;
pub mod cli;
pub mod core;
pub mod engine;
pub mod entities;
pub mod schema;
pub mod yaml;
