//! Working directory layout and per-directory run exclusion.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::config::RunnerConfig;
use crate::error::{RunError, RunResult};

/// Resolved paths for one working directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    script_path: PathBuf,
    output_dir: PathBuf,
    data_dir: PathBuf,
    secondary_output_dir: Option<PathBuf>,
}

impl Workspace {
    pub fn new(root: &Path, config: &RunnerConfig) -> Self {
        Self {
            script_path: root.join(&config.script_path),
            output_dir: root.join(&config.output_dir),
            data_dir: root.join(&config.data_dir),
            secondary_output_dir: config.secondary_output_dir.as_ref().map(|d| root.join(d)),
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub async fn has_script(&self) -> RunResult<bool> {
        match tokio::fs::metadata(&self.script_path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RunError::io(&self.script_path, e)),
        }
    }

    /// Create the output and artifact directories if missing.
    pub async fn ensure_dirs(&self) -> RunResult<()> {
        for dir in [&self.output_dir, &self.data_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| RunError::io(dir, e))?;
        }
        Ok(())
    }

    /// Positional arguments handed to the interpreter.
    pub fn script_args(&self) -> Vec<PathBuf> {
        let mut args = vec![self.script_path.clone()];
        if let Some(secondary) = &self.secondary_output_dir {
            args.push(secondary.clone());
        }
        args.push(self.output_dir.clone());
        args
    }
}

type LockMap = Arc<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>;

/// Serialises runs that target the same working directory.
///
/// An entry lives only while some run holds or waits for its directory.
#[derive(Clone, Default)]
pub struct WorkspaceLocks {
    locks: LockMap,
}

/// Exclusive use of one working directory; released on drop.
pub struct WorkspaceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: PathBuf,
    locks: LockMap,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `dir`.
    pub async fn acquire(&self, dir: &Path) -> WorkspaceGuard {
        let key = tokio::fs::canonicalize(dir)
            .await
            .unwrap_or_else(|_| dir.to_path_buf());

        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.clone()).or_default().clone()
        };

        debug!("Waiting for workspace lock on {}", key.display());
        WorkspaceGuard {
            guard: Some(lock.lock_owned().await),
            key,
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_script_args_two_positional() {
        let ws = Workspace::new(Path::new("/work"), &RunnerConfig::default());
        assert_eq!(
            ws.script_args(),
            vec![
                PathBuf::from("/work/python/script.py"),
                PathBuf::from("/work/python"),
            ]
        );
    }

    #[test]
    fn test_script_args_with_secondary_output() {
        let config = RunnerConfig {
            secondary_output_dir: Some(PathBuf::from("scanpy")),
            ..RunnerConfig::default()
        };
        let ws = Workspace::new(Path::new("/work"), &config);
        assert_eq!(
            ws.script_args(),
            vec![
                PathBuf::from("/work/python/script.py"),
                PathBuf::from("/work/scanpy"),
                PathBuf::from("/work/python"),
            ]
        );
    }

    #[tokio::test]
    async fn test_ensure_dirs_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path(), &RunnerConfig::default());

        assert!(!ws.has_script().await.unwrap());
        ws.ensure_dirs().await.unwrap();
        ws.ensure_dirs().await.unwrap();

        assert!(ws.output_dir().is_dir());
        assert!(ws.data_dir().is_dir());
    }

    #[tokio::test]
    async fn test_same_directory_is_exclusive() {
        let tmp = tempfile::tempdir().unwrap();
        let locks = WorkspaceLocks::new();

        let guard = locks.acquire(tmp.path()).await;

        let contender = {
            let locks = locks.clone();
            let dir = tmp.path().to_path_buf();
            tokio::spawn(async move {
                let _guard = locks.acquire(&dir).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_released_directories_are_forgotten() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let locks = WorkspaceLocks::new();

        let guard_a = locks.acquire(a.path()).await;
        let guard_b = locks.acquire(b.path()).await;
        assert_eq!(locks.tracked(), 2);

        drop(guard_a);
        assert_eq!(locks.tracked(), 1);
        drop(guard_b);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_a_run_waits() {
        let tmp = tempfile::tempdir().unwrap();
        let locks = WorkspaceLocks::new();

        let guard = locks.acquire(tmp.path()).await;
        let waiter = {
            let locks = locks.clone();
            let dir = tmp.path().to_path_buf();
            tokio::spawn(async move {
                let _guard = locks.acquire(&dir).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(guard);
        assert_eq!(locks.tracked(), 1);

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_different_directories_do_not_block() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let locks = WorkspaceLocks::new();

        let _guard_a = locks.acquire(a.path()).await;
        let guard_b = tokio::time::timeout(Duration::from_secs(1), locks.acquire(b.path())).await;
        assert!(guard_b.is_ok());
    }
}
