use std::fmt;
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};

use crate::bucket::BucketPath;
use crate::error::PipelineError;
use crate::fs_util;
use crate::storage::ObjectStoreClient;

/// Local mirror of bucket files, reproducing the bucket path structure
/// under one root. The mirroring avoids name clashes and guarantees that
/// the same remote object always resolves to the same local path, which is
/// what makes skip-on-exists caching sound. Entries are never evicted.
pub struct FileCache<C> {
    local_root: Utf8PathBuf,
    client: C,
}

/// Outcome of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Skipped,
    Done,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Skipped => write!(f, "SKIP"),
            TransferStatus::Done => write!(f, "SUCCESS"),
        }
    }
}

impl<C: ObjectStoreClient> FileCache<C> {
    pub fn new(local_root: Utf8PathBuf, client: C) -> Self {
        Self { local_root, client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Pure mapping `root / bucket / relative_path`. Does not touch the
    /// filesystem; presence of the file at this path is the cache state.
    pub fn local_path(&self, path: &BucketPath) -> Utf8PathBuf {
        self.local_root.join(path.bucket()).join(path.relative_path())
    }

    /// Downloads one object into the mirror. Returns `Skipped` without any
    /// network call when the mirror file already exists. A missing remote
    /// object is an error, not a skip.
    pub fn download(&self, path: &BucketPath) -> Result<TransferStatus, PipelineError> {
        let local_path = self.local_path(path);
        if local_path.as_std_path().exists() {
            tracing::info!("skipping download of '{path}', already in the local file cache");
            return Ok(TransferStatus::Skipped);
        }
        fs_util::create_parent_dirs(&local_path)?;
        self.client.download(path, &local_path)?;
        Ok(TransferStatus::Done)
    }

    /// Uploads one mirror file. Results are write-once: if the destination
    /// already exists in the bucket this fails before any network write.
    pub fn upload(&self, path: &BucketPath) -> Result<TransferStatus, PipelineError> {
        let local_path = self.local_path(path);
        if self.client.exists(path)? {
            return Err(PipelineError::RemoteAlreadyExists(path.to_string()));
        }
        self.client.upload(&local_path, path)?;
        Ok(TransferStatus::Done)
    }

    /// Concurrent bulk download, one worker per path. All workers run to
    /// completion before the batch reports; a single failure fails the
    /// whole batch but does not cancel or roll back siblings.
    pub fn download_all(&self, paths: &[BucketPath]) -> Result<(), PipelineError> {
        self.transfer_all(paths, "download", |path| self.download(path))
    }

    /// Concurrent bulk upload with the same all-or-nothing reporting as
    /// `download_all`.
    pub fn upload_all(&self, paths: &[BucketPath]) -> Result<(), PipelineError> {
        self.transfer_all(paths, "upload", |path| self.upload(path))
    }

    fn transfer_all<F>(
        &self,
        paths: &[BucketPath],
        action: &'static str,
        op: F,
    ) -> Result<(), PipelineError>
    where
        F: Fn(&BucketPath) -> Result<TransferStatus, PipelineError> + Sync,
    {
        let mut failures: Vec<String> = Vec::new();
        thread::scope(|scope| {
            let handles: Vec<_> = paths
                .iter()
                .map(|path| {
                    tracing::info!("submitting {action} of '{path}'");
                    (path, scope.spawn(|| op(path)))
                })
                .collect();

            for (path, handle) in handles {
                match handle.join() {
                    Ok(Ok(status)) => {
                        tracing::info!("finished {action} of '{path}' with result '{status}'");
                    }
                    Ok(Err(err)) => failures.push(format!("{path}: {err}")),
                    Err(_) => failures.push(format!("{path}: {action} worker panicked")),
                }
            }
        });

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::BatchTransfer {
                action,
                failed: failures.len(),
                total: paths.len(),
                details: failures.join("\n"),
            })
        }
    }
}
