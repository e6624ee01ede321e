//! Summary plugin contracts.
//!
//! Plugins are in-process collaborators described by a manifest. The core
//! hands them an evidence bundle and never interprets what they return.
//! Loading plugin code from disk is not supported.

pub mod default_plugin;
pub mod manifest;
pub mod plugin;
pub mod registry;
