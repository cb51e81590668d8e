// Per-job scratch directories.
//
// Each job owns exactly one workspace under the sandbox root. The path is
// resolved to an absolute form because the container runtime mounts
// absolute paths only. Cleanup must happen on every exit path, so the
// workspace doubles as a drop guard: explicit `destroy` on the normal
// path, best-effort removal on drop for panics and early returns.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ExecError;

pub struct Workspace {
    path: PathBuf,
    armed: bool,
}

impl Workspace {
    /// Create `<root>/<job_id>` with permissive mode and resolve it to an
    /// absolute path. Job ids are globally unique, so concurrent creates
    /// always produce disjoint paths.
    pub async fn create(root: &Path, job_id: &str) -> Result<Self, ExecError> {
        let dir = root.join(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        make_world_writable(&dir).await?;
        let path = tokio::fs::canonicalize(&dir).await?;
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a file directly under the workspace root.
    pub async fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, ExecError> {
        let path = self.path.join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Create a subdirectory, world-writable so the container user can
    /// produce files in it.
    pub async fn create_dir(&self, name: &str) -> Result<PathBuf, ExecError> {
        let dir = self.path.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        make_world_writable(&dir).await?;
        Ok(dir)
    }

    /// Recursively remove the workspace, tolerating an already-missing
    /// directory.
    pub async fn destroy(mut self) {
        self.armed = false;
        if let Err(err) = tokio::fs::remove_dir_all(&self.path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove workspace");
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// Processes inside the container may run as an arbitrary uid; the mounted
/// directory has to stay writable for them.
pub(crate) async fn make_world_writable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777)).await?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_resolves_absolute_path() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "job_1").await.unwrap();
        assert!(ws.path().is_absolute());
        assert!(ws.path().is_dir());
        ws.destroy().await;
    }

    #[tokio::test]
    async fn test_destroy_removes_directory_and_contents() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "job_2").await.unwrap();
        ws.write_file("main.py", "print('x')").await.unwrap();
        ws.create_dir("testcases").await.unwrap();
        let path = ws.path().to_path_buf();
        ws.destroy().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_cleans_up_on_early_exit() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::create(root.path(), "job_3").await.unwrap();
            ws.write_file("main.py", "print('x')").await.unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_distinct_job_ids_get_disjoint_paths() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(root.path(), "job_a").await.unwrap();
        let b = Workspace::create(root.path(), "job_b").await.unwrap();
        assert_ne!(a.path(), b.path());
        a.destroy().await;
        assert!(b.path().exists());
        b.destroy().await;
    }
}
