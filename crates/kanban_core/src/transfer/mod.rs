//! Portable export documents and conflict-aware import.

pub mod document;
pub mod export;
pub mod import;
