//! Scoped working directory for artifact scoring.

use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tracing::debug;
use xc_common::Result;
use xc_config::SandboxSettings;

/// Temporary directory holding the artifact, the exported dataset and the
/// scorer output. Removed on drop, including on early returns and panics.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
    keep_on_failure: bool,
}

impl Sandbox {
    pub fn create(settings: &SandboxSettings) -> Result<Self> {
        let mut builder = Builder::new();
        builder.prefix("xc-sandbox-");
        let dir = match &settings.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "created sandbox");
        Ok(Self {
            dir,
            keep_on_failure: settings.keep_on_failure,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Close the sandbox after a comparison. Returns the retained path when
    /// the comparison failed and the settings ask to keep it.
    pub fn finish(self, passed: bool) -> Option<PathBuf> {
        if !passed && self.keep_on_failure {
            Some(self.dir.keep())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(root: &Path, keep_on_failure: bool) -> SandboxSettings {
        SandboxSettings {
            root: Some(root.to_path_buf()),
            keep_on_failure,
        }
    }

    #[test]
    fn test_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let path = {
            let sandbox = Sandbox::create(&settings(root.path(), false)).unwrap();
            std::fs::write(sandbox.join("in.csv"), "a\n1\n").unwrap();
            sandbox.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_only_on_failure() {
        let root = TempDir::new().unwrap();

        let passing = Sandbox::create(&settings(root.path(), true)).unwrap();
        let path = passing.path().to_path_buf();
        assert_eq!(passing.finish(true), None);
        assert!(!path.exists());

        let failing = Sandbox::create(&settings(root.path(), true)).unwrap();
        let kept = failing.finish(false).unwrap();
        assert!(kept.exists());
        assert!(kept.starts_with(root.path()));

        let not_kept = Sandbox::create(&settings(root.path(), false)).unwrap();
        assert_eq!(not_kept.finish(false), None);
    }
}
