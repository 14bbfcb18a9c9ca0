use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::ArtifactError;
use crate::sanitize::redact_path;

const NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Input,
    Output,
}

impl ArtifactKind {
    fn directory_name(self) -> &'static str {
        match self {
            ArtifactKind::Input => "inputs",
            ArtifactKind::Output => "outputs",
        }
    }
}

/// Owns the work directory holding uploaded audio and rendered subtitles.
///
/// Nothing in it survives a restart: `open` clears whatever a previous
/// process left behind.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, ArtifactError> {
        let store = Self {
            root: root.as_ref().to_path_buf(),
        };

        for kind in [ArtifactKind::Input, ArtifactKind::Output] {
            let dir = store.directory(kind);
            std::fs::create_dir_all(&dir).map_err(|e| ArtifactError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;
            let purged = purge_directory(&dir);
            if purged > 0 {
                info!("Removed {} stale {} artifact(s)", purged, kind.directory_name());
            }
        }

        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn directory(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.directory_name())
    }

    /// Creates a new empty artifact and returns it with a write handle.
    ///
    /// The artifact is released when the returned guard is dropped unless it
    /// is persisted first.
    pub async fn create(
        &self,
        kind: ArtifactKind,
        owner: Option<&str>,
        extension: &str,
    ) -> Result<(TempArtifact, tokio::fs::File), ArtifactError> {
        let dir = self.directory(kind);

        for _ in 0..NAME_ATTEMPTS {
            let path = dir.join(format!("{}.{}", uuid::Uuid::new_v4(), extension));

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    debug!("Created {:?} artifact {}", kind, redact_path(&path));
                    let artifact = TempArtifact {
                        path,
                        kind,
                        owner: owner.map(str::to_string),
                        armed: true,
                    };
                    return Ok((artifact, file));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(ArtifactError::Create { path, source: e }),
            }
        }

        Err(ArtifactError::NameExhausted(dir))
    }

    /// Writes a rendered subtitle document into a fresh output artifact.
    pub async fn materialize_output(
        &self,
        job_id: Option<&str>,
        content: &str,
    ) -> Result<TempArtifact, ArtifactError> {
        let (artifact, mut file) = self.create(ArtifactKind::Output, job_id, "srt").await?;

        let written = async {
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await
        }
        .await;

        // On error the guard drops here and removes the partial file.
        written.map_err(|e| ArtifactError::Write {
            path: artifact.path().to_path_buf(),
            source: e,
        })?;

        Ok(artifact)
    }

    /// Deletes the file at `path`. Returns whether a file was removed.
    ///
    /// A path that no longer exists is not an error, so releasing twice is
    /// harmless.
    pub fn release(path: &Path) -> Result<bool, ArtifactError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Released artifact {}", redact_path(path));
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ArtifactError::Remove {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Number of files currently held for `kind`.
    pub fn count(&self, kind: ArtifactKind) -> usize {
        std::fs::read_dir(self.directory(kind))
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }
}

fn purge_directory(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to scan {}: {}", redact_path(dir), e);
            return 0;
        }
    };

    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| match ArtifactStore::release(&e.path()) {
            Ok(removed) => removed,
            Err(err) => {
                warn!("{}", err);
                false
            }
        })
        .count()
}

/// Scoped ownership of a temporary artifact.
///
/// Dropping the guard deletes the file. `persist` hands ownership to an
/// [`ArtifactRef`] instead.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    kind: ArtifactKind,
    owner: Option<String>,
    armed: bool,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn release(mut self) -> Result<bool, ArtifactError> {
        self.armed = false;
        ArtifactStore::release(&self.path)
    }

    /// Keeps the file on disk. Whoever holds the returned reference is now
    /// responsible for releasing it.
    pub fn persist(mut self) -> ArtifactRef {
        self.armed = false;
        ArtifactRef {
            path: std::mem::take(&mut self.path),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = ArtifactStore::release(&self.path) {
                warn!("Failed to release artifact on drop: {}", e);
            }
        }
    }
}

/// A persisted output artifact owned by a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    path: PathBuf,
}

impl ArtifactRef {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn release(&self) -> Result<bool, ArtifactError> {
        ArtifactStore::release(&self.path)
    }

    pub async fn read_to_string(&self) -> Result<String, ArtifactError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ArtifactError::Read {
                path: self.path.clone(),
                source: e,
            })
    }
}
