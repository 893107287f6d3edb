//! File-system-related stuff: per-judgement workspaces and their cleanup.

use crate::{
    client::JudgeErr,
    util::{names::transform_string_as_dir_name, path_security::enforce_child_path, AsyncTeardown},
};
use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt, StreamExt};
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};
use tokio_stream::wrappers::ReadDirStream;

/// Attempts at finding an unused workspace name before giving up.
const MAX_CREATE_ATTEMPTS: usize = 16;

/// A directory exclusively owned by one judgement.
///
/// Two judgements never share a workspace, even when they carry the same
/// correlation id. The directory is removed on [`AsyncTeardown::teardown`]
/// unless it is kept for debugging.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    keep: bool,
    torn_down: bool,
}

impl Workspace {
    /// Create a fresh, empty workspace under `work_root`.
    pub async fn create(work_root: &Path, correlation_id: &str, keep: bool) -> Result<Workspace, JudgeErr> {
        let work_root = work_root.absolutize()?.into_owned();
        tokio::fs::create_dir_all(&work_root).await?;

        let prefix = transform_string_as_dir_name(correlation_id);
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let root = work_root.join(format!("{}-{:08x}", prefix, rand::random::<u32>()));
            match tokio::fs::create_dir(&root).await {
                Ok(()) => {
                    tracing::debug!(?root, "Workspace created");
                    return Ok(Workspace {
                        root,
                        keep,
                        torn_down: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(JudgeErr::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free workspace name under {:?}", work_root),
        )))
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `content` to `file_name` inside the workspace.
    pub async fn materialize(&self, file_name: &str, content: &str) -> Result<PathBuf, JudgeErr> {
        enforce_child_path(Path::new(file_name)).map_err(JudgeErr::UnsafePath)?;
        let path = self.root.join(file_name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}

#[async_trait]
impl AsyncTeardown for Workspace {
    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if self.keep {
            tracing::info!(root = ?self.root, "Keeping workspace");
            return;
        }
        // Failure is only logged; a leftover directory never changes a verdict
        let _ = ensure_removed_dir(&self.root).await;
    }
}

/// Remove a directory and everything below it, subdirectories first.
pub fn ensure_removed_dir(path: &Path) -> BoxFuture<Result<(), std::io::Error>> {
    async move {
        let dir = tokio::fs::read_dir(path).await?;
        ReadDirStream::new(dir)
            .filter_map(|x| async move {
                let x = x.ok()?;
                if x.file_type().await.map(|x| x.is_dir()).unwrap_or(false) {
                    Some(x.path())
                } else {
                    None
                }
            })
            .map(|x| async move { ensure_removed_dir(&x).await })
            .buffered(16usize)
            .for_each(|_| async {})
            .await;
        let res = tokio::fs::remove_dir_all(path).await;
        if let Err(e) = &res {
            tracing::error!("{:?}: {}", path, e);
        }
        res
    }
    .boxed()
}
