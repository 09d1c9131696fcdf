//! Per-run scratch storage.
//!
//! A [`WorkspaceManager`] hands out one [`Workspace`] per pipeline run: a
//! fresh directory under the scratch root named after the run's
//! [`RequestId`] plus a random suffix, holding exactly two files, the fetched
//! input and the transcoded output. The directory is removed exactly once,
//! either by [`Workspace::release`] or, if the run unwinds before reaching
//! it, when the `Workspace` is dropped. Removal failures are logged and never
//! reported to the caller.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use mr_core::RequestId;

/// File name of the fetched source inside a workspace.
const INPUT_NAME: &str = "input";

/// Allocates workspaces under a shared scratch root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Use `root` as the scratch root, or the system temp dir when `None`.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: root.unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a workspace for one run.
    ///
    /// `output_extension` names the output file (`output.<ext>`) so the
    /// transcoder can infer the container from it.
    pub fn acquire(
        &self,
        request_id: RequestId,
        output_extension: &str,
    ) -> mr_core::Result<Workspace> {
        std::fs::create_dir_all(&self.root)?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("mr-{request_id}-"))
            .tempdir_in(&self.root)?;

        let input = dir.path().join(INPUT_NAME);
        let output = dir.path().join(format!("output.{output_extension}"));

        tracing::debug!(
            request_id = %request_id,
            path = %dir.path().display(),
            "Workspace acquired"
        );

        Ok(Workspace {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            input,
            output,
            request_id,
        })
    }
}

/// Scratch directory owned by exactly one pipeline run.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    input: PathBuf,
    output: PathBuf,
    request_id: RequestId,
}

impl Workspace {
    /// Where the fetcher writes the source.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Where the transcoder writes the artifact.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The workspace directory itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the workspace. Failures are logged, not returned.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => tracing::debug!(
                request_id = %self.request_id,
                path = %self.path.display(),
                "Workspace released"
            ),
            Err(e) => tracing::warn!(
                request_id = %self.request_id,
                path = %self.path.display(),
                "Failed to remove workspace: {e}"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.dir.is_some() {
            tracing::debug!(request_id = %self.request_id, "Releasing workspace on drop");
            self.release_inner();
        }
    }
}
