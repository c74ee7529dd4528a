//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML file from the platform config
//! directory (or an explicit path) and supplies defaults for anything the
//! file leaves out.

pub mod config;
