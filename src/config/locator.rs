//! Discovery of the four canonical layer files.
//!
//! ## Project anchor
//!
//! Starting at the working directory, walk upward until a directory holds
//! `<app>.config.json` or `<app>.config.user.json`. Both project layers live
//! there. If no directory qualifies, the working directory is used so a `set`
//! still has somewhere to write. The home directory is never a project
//! anchor, since its files are the global layers.
//!
//! ## Global anchor
//!
//! The home directory, overridable with `<APP>_CLI_HOME`.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Paths of the four layers, highest precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPaths {
    pub project_user: PathBuf,
    pub project: PathBuf,
    pub global_user: PathBuf,
    pub global: PathBuf,
}

impl LayerPaths {
    /// `(path, user, global)` for each layer in precedence order.
    pub fn ordered(&self) -> [(&Path, bool, bool); 4] {
        [
            (self.project_user.as_path(), true, false),
            (self.project.as_path(), false, false),
            (self.global_user.as_path(), true, true),
            (self.global.as_path(), false, true),
        ]
    }
}

/// Finds layer files for an application.
#[derive(Debug, Clone)]
pub struct LayerLocator {
    app_name: String,
    cwd: Option<PathBuf>,
    home: Option<PathBuf>,
}

impl LayerLocator {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            cwd: None,
            home: None,
        }
    }

    /// Search from this directory instead of the process working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Use this directory as the global anchor.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// `<app>.config.json`
    pub fn config_file_name(&self) -> String {
        format!("{}.config.json", self.app_name)
    }

    /// `<app>.config.user.json`
    pub fn user_config_file_name(&self) -> String {
        format!("{}.config.user.json", self.app_name)
    }

    /// Environment variable overriding the home directory.
    pub fn home_env_var(&self) -> String {
        format!("{}_CLI_HOME", env_prefix(&self.app_name))
    }

    /// Resolve all four layer paths against the filesystem as it is now.
    pub fn locate(&self) -> Result<LayerPaths> {
        let cwd = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()?,
        };
        let home = self.home_dir()?;

        let project_dir = self.find_project_dir(&cwd, &home).unwrap_or(cwd);
        debug!(
            "Layer anchors: project={}, global={}",
            project_dir.display(),
            home.display()
        );

        Ok(LayerPaths {
            project_user: project_dir.join(self.user_config_file_name()),
            project: project_dir.join(self.config_file_name()),
            global_user: home.join(self.user_config_file_name()),
            global: home.join(self.config_file_name()),
        })
    }

    /// First directory at or above `start` that holds a layer file.
    pub fn find_project_dir(&self, start: &Path, home: &Path) -> Option<PathBuf> {
        let names = [self.config_file_name(), self.user_config_file_name()];
        start
            .ancestors()
            .filter(|dir| *dir != home)
            .find(|dir| names.iter().any(|name| dir.join(name).is_file()))
            .map(Path::to_path_buf)
    }

    /// Global anchor: explicit home, then `<APP>_CLI_HOME`, then the user's home.
    pub fn home_dir(&self) -> Result<PathBuf> {
        if let Some(home) = &self.home {
            return Ok(home.clone());
        }
        if let Ok(home) = std::env::var(self.home_env_var()) {
            if !home.is_empty() {
                return Ok(PathBuf::from(home));
            }
        }
        dirs::home_dir().ok_or_else(|| Error::Other("Could not determine home directory".to_string()))
    }
}

/// Upper-cased app name usable as an environment variable prefix.
pub fn env_prefix(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
