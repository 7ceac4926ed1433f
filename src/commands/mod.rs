pub mod diff;
pub mod exec_script;
pub mod generate;

use crate::config::ProjectConfig;
use anyhow::Result;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// `--config` as given
    pub config: Option<PathBuf>,
}

impl Context {
    pub fn project_config(&self) -> Result<(ProjectConfig, Option<PathBuf>)> {
        ProjectConfig::load(self.config.as_deref())
    }
}

/// Lead with the category and its advice; the error itself becomes the cause.
pub fn embedded_error(err: embedded::Error) -> anyhow::Error {
    let category = err.category();
    anyhow::Error::new(err).context(format!("{} ({})", category, category.advice()))
}

/// Same as [`embedded_error`] for diff failures.
pub fn diff_error(err: featurediff::Error) -> anyhow::Error {
    let category = err.category();
    anyhow::Error::new(err).context(format!("{} ({})", category, category.advice()))
}
