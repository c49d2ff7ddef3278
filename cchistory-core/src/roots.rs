use std::env;
use std::path::{Path, PathBuf};

use dirs::home_dir;

use crate::error::{HistoryError, Result};
use crate::paths::encode_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRoots {
    pub claude_root: PathBuf,
}

impl HistoryRoots {
    pub fn new(claude_root: impl Into<PathBuf>) -> Self {
        Self {
            claude_root: claude_root.into(),
        }
    }

    pub fn from_env_or_home() -> Result<Self> {
        // Precedence:
        // 1) CLAUDE_CONFIG_DIR (official Claude Code config/data root env)
        // 2) ~/.claude (Claude default)
        if let Some(root) = env::var_os("CLAUDE_CONFIG_DIR").filter(|path| !path.is_empty()) {
            return Ok(Self::new(root));
        }

        let home = home_dir().ok_or(HistoryError::HomeDirectoryNotFound)?;
        Ok(Self::new(home.join(".claude")))
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.claude_root.join("projects")
    }

    /// Storage directory for a project, given the project's filesystem path.
    ///
    /// Relative paths are made absolute against the current directory first.
    /// Paths starting with `/` count as absolute on every platform so the same
    /// input encodes identically everywhere.
    pub fn project_dir(&self, project_path: &Path) -> Result<PathBuf> {
        let absolute = if project_path.is_absolute() || project_path.starts_with("/") {
            project_path.to_path_buf()
        } else {
            env::current_dir()
                .map_err(|source| HistoryError::Io {
                    path: project_path.to_path_buf(),
                    source,
                })?
                .join(project_path)
        };

        Ok(self
            .projects_dir()
            .join(encode_path(&absolute.to_string_lossy())))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::HistoryRoots;

    #[test]
    fn project_dir_encodes_absolute_path() {
        let roots = HistoryRoots::new("/home/me/.claude");
        let dir = roots
            .project_dir(Path::new("/home/me/work/my.app"))
            .expect("project dir");
        assert_eq!(
            dir,
            Path::new("/home/me/.claude/projects/-home-me-work-my-app")
        );
    }

    #[test]
    fn relative_project_path_is_absolutized() {
        let roots = HistoryRoots::new("/tmp/claude");
        let dir = roots.project_dir(Path::new("repo")).expect("project dir");
        let name = dir
            .file_name()
            .and_then(|name| name.to_str())
            .expect("encoded name");
        assert!(name.starts_with('-') || name.contains("--"));
        assert!(name.ends_with("-repo"));
    }
}
