use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Files created during one pipeline run.
///
/// Paths are tracked before the producing step runs, so partial outputs of a
/// failed step are removed too. `cleanup` is the normal path; `Drop` catches
/// runs that were cancelled or panicked before reaching it.
#[derive(Debug, Default)]
pub struct Artifacts {
    paths: Vec<PathBuf>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Removes every tracked file that exists. Failures are logged only.
    /// Returns how many files were actually deleted.
    pub async fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for path in self.paths.drain(..) {
            if remove_logged(&path, tokio::fs::remove_file(&path).await) {
                removed += 1;
            }
        }
        removed
    }
}

fn remove_logged(path: &Path, result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "artifact removed");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "artifact cleanup failed");
            false
        }
    }
}

impl Drop for Artifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let result = std::fs::remove_file(&path);
            remove_logged(&path, result);
        }
    }
}
