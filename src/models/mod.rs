//! Data models for the packaging pipeline.

pub mod detection;
pub mod error;
pub mod msi;
pub mod package;
