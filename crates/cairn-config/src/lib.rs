//! Configuration system for the Cairn memory engine.
//!
//! Provides:
//! - TOML configuration loaded from the per-user config directory
//!   (`$CAIRN_CONFIG_DIR/config.toml` or `~/.config/cairn/config.toml`)
//! - Backend connection settings for the record store, semantic index and
//!   relationship graph
//! - Project isolation resolution from `.cairn/project.json` markers

pub mod discovery;
pub mod error;
pub mod project;
pub mod types;

pub use discovery::{
    LoadedConfig, data_dir, load_config, load_config_file, load_config_with_options, save_config,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use project::{MAX_MARKER_HOPS, MARKER_DIR, MARKER_FILE, ProjectMarker, resolve_project};
pub use types::*;
