//! CLI command handlers.

pub mod clear;
pub mod context;
pub mod history;
pub mod reindex;
pub mod remember;
pub mod reminders;
pub mod stats;
pub mod tasks;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use console::Style;
use tracing::debug;

use cairn_memory::MemoryEngine;
use cairn_types::ProjectIdentity;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Config directory override.
    pub config_dir: Option<PathBuf>,
    /// Directory whose project the command acts on.
    pub project_dir: PathBuf,
}

impl Context {
    /// The project the command acts on.
    pub fn identity(&self) -> Result<ProjectIdentity> {
        let dir = self
            .project_dir
            .canonicalize()
            .unwrap_or_else(|_| self.project_dir.clone());
        Ok(cairn_config::resolve_project(&dir)?)
    }

    /// Load configuration and open every backend for the current project.
    ///
    /// Fails only when the record store is missing from the configuration or
    /// cannot be opened.
    pub fn open_engine(&self) -> Result<MemoryEngine> {
        let loaded = cairn_config::load_config_with_options(self.config_dir.as_deref())
            .context("loading configuration")?;
        let identity = self.identity()?;
        debug!(
            config = %loaded.path.display(),
            loaded = loaded.loaded,
            project = %identity.key,
            "opening memory engine"
        );

        if self.verbose {
            let dim = Style::new().dim();
            eprintln!(
                "{}",
                dim.apply_to(format!(
                    "config: {} | project: {} ({})",
                    loaded.path.display(),
                    identity.key,
                    identity.isolation
                ))
            );
        }

        Ok(MemoryEngine::from_config(
            &loaded.config,
            &loaded.path,
            identity,
        )?)
    }
}

/// Print a bold section header with a rule beneath it.
pub fn header(title: &str) {
    let dim = Style::new().dim();
    println!("{}", Style::new().bold().apply_to(title));
    println!("{}", dim.apply_to("─".repeat(50)));
}

/// Truncate to `max` characters, appending `...` when cut.
pub fn truncate(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
