use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{info_span, Instrument};

use crate::error::{ArtifactError, SubmissionError};
use crate::sanitize::client_filename;
use crate::storage::{ArtifactKind, ArtifactStore, TempArtifact};

/// Audio container extensions accepted for transcription.
pub const SUPPORTED_FORMATS: &[&str] = &["mp3", "wav", "m4a", "flac", "ogg", "wma"];

const CHUNK_SIZE: usize = 1024 * 1024;

/// An upload that passed validation and is buffered on disk.
#[derive(Debug)]
pub struct AcceptedUpload {
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub artifact: TempArtifact,
}

impl AcceptedUpload {
    pub fn mime_type(&self) -> String {
        mime_guess::from_ext(&self.extension)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Validates uploads and streams them into input artifacts.
pub struct SubmissionGate {
    artifacts: Arc<ArtifactStore>,
    max_upload_bytes: u64,
}

impl SubmissionGate {
    pub fn new(artifacts: Arc<ArtifactStore>, max_upload_bytes: u64) -> Self {
        Self {
            artifacts,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Checks the declared filename and returns `(filename, extension)`.
    pub fn validate_filename(
        &self,
        filename: Option<&str>,
    ) -> Result<(String, String), SubmissionError> {
        let filename = filename
            .and_then(client_filename)
            .ok_or(SubmissionError::MissingFilename)?;

        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !SUPPORTED_FORMATS.contains(&extension.as_str()) {
            return Err(SubmissionError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{}", extension)
                },
                supported: supported_formats_list(),
            });
        }

        Ok((filename, extension))
    }

    /// Validates the name, then streams `body` to disk in fixed-size chunks.
    ///
    /// Stops reading as soon as the running total passes the ceiling. Any
    /// rejection after the artifact was created removes it before returning.
    pub async fn accept<R>(
        &self,
        filename: Option<&str>,
        owner: Option<&str>,
        body: R,
    ) -> Result<AcceptedUpload, SubmissionError>
    where
        R: AsyncRead + Send,
    {
        let (filename, extension) = self.validate_filename(filename)?;

        let span = info_span!("submission", file = %filename);
        async move {
            let (artifact, mut file) = self
                .artifacts
                .create(ArtifactKind::Input, owner, &extension)
                .await?;

            tokio::pin!(body);
            let mut buffer = vec![0u8; CHUNK_SIZE];
            let mut total: u64 = 0;

            loop {
                let read = body
                    .read(&mut buffer)
                    .await
                    .map_err(SubmissionError::Stream)?;
                if read == 0 {
                    break;
                }

                total += read as u64;
                if total > self.max_upload_bytes {
                    drop(file);
                    match artifact.release() {
                        Ok(_) => tracing::info!(
                            limit = self.max_upload_bytes,
                            "Upload exceeded size ceiling, partial file removed"
                        ),
                        Err(e) => tracing::warn!(
                            limit = self.max_upload_bytes,
                            error = %e,
                            "Upload exceeded size ceiling, partial file could not be removed"
                        ),
                    }
                    return Err(SubmissionError::PayloadTooLarge {
                        limit_bytes: self.max_upload_bytes,
                    });
                }

                file.write_all(&buffer[..read])
                    .await
                    .map_err(|e| ArtifactError::Write {
                        path: artifact.path().to_path_buf(),
                        source: e,
                    })?;
            }

            file.flush().await.map_err(|e| ArtifactError::Write {
                path: artifact.path().to_path_buf(),
                source: e,
            })?;

            tracing::debug!(size_bytes = total, "Upload buffered");

            Ok(AcceptedUpload {
                filename,
                extension,
                size_bytes: total,
                artifact,
            })
        }
        .instrument(span)
        .await
    }
}

pub fn supported_formats_list() -> String {
    SUPPORTED_FORMATS
        .iter()
        .map(|f| format!(".{}", f))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gate(limit: u64) -> (TempDir, Arc<ArtifactStore>, SubmissionGate) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::open(temp.path()).unwrap());
        let gate = SubmissionGate::new(Arc::clone(&store), limit);
        (temp, store, gate)
    }

    #[tokio::test]
    async fn test_accepts_supported_upload() {
        let (_temp, store, gate) = gate(1024);
        let body: &[u8] = &[7u8; 300];

        let upload = gate.accept(Some("Talk.MP3"), None, body).await.unwrap();
        assert_eq!(upload.filename, "Talk.MP3");
        assert_eq!(upload.extension, "mp3");
        assert_eq!(upload.size_bytes, 300);
        assert_eq!(upload.mime_type(), "audio/mpeg");
        assert_eq!(std::fs::metadata(upload.artifact.path()).unwrap().len(), 300);
        assert_eq!(store.count(ArtifactKind::Input), 1);
    }

    #[tokio::test]
    async fn test_exact_ceiling_is_accepted() {
        let (_temp, _store, gate) = gate(100);
        let body: &[u8] = &[0u8; 100];
        let upload = gate.accept(Some("a.wav"), None, body).await.unwrap();
        assert_eq!(upload.size_bytes, 100);
    }

    #[tokio::test]
    async fn test_missing_filename() {
        let (_temp, store, gate) = gate(1024);
        let body: &[u8] = b"abc";

        let err = gate.accept(None, None, body).await.unwrap_err();
        assert!(matches!(err, SubmissionError::MissingFilename));
        let err = gate.accept(Some(""), None, body).await.unwrap_err();
        assert!(matches!(err, SubmissionError::MissingFilename));
        assert_eq!(store.count(ArtifactKind::Input), 0);
    }

    #[tokio::test]
    async fn test_unsupported_format_leaves_nothing() {
        let (_temp, store, gate) = gate(1024);
        let body: &[u8] = b"abc";

        let err = gate.accept(Some("notes.txt"), None, body).await.unwrap_err();
        match err {
            SubmissionError::UnsupportedFormat {
                extension,
                supported,
            } => {
                assert_eq!(extension, ".txt");
                assert!(supported.contains(".flac"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = gate.accept(Some("noext"), None, body).await.unwrap_err();
        assert!(matches!(err, SubmissionError::UnsupportedFormat { .. }));
        assert_eq!(store.count(ArtifactKind::Input), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_removes_partial_file() {
        let (_temp, store, gate) = gate(CHUNK_SIZE as u64 + 10);
        let body = vec![1u8; CHUNK_SIZE * 3];

        let err = gate
            .accept(Some("long.flac"), None, body.as_slice())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::PayloadTooLarge { limit_bytes } if limit_bytes == CHUNK_SIZE as u64 + 10
        ));
        assert_eq!(store.count(ArtifactKind::Input), 0);
    }

    #[tokio::test]
    async fn test_stream_error_removes_partial_file() {
        let (_temp, store, gate) = gate(1024);
        let body = disconnecting_reader();

        let err = gate.accept(Some("a.ogg"), None, body).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Stream(_)));
        assert_eq!(store.count(ArtifactKind::Input), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_reported_even_if_cleanup_fails() {
        let (_temp, store, gate) = gate(CHUNK_SIZE as u64);
        let body = BlockingCleanupReader {
            inputs: store.directory(ArtifactKind::Input),
            reads: 0,
        };

        let err = gate.accept(Some("long.wav"), None, body).await.unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::PayloadTooLarge { limit_bytes } if limit_bytes == CHUNK_SIZE as u64
        ));
    }

    /// Fills the first read, then swaps the partial upload for a directory
    /// so removing it fails, then keeps producing data past the ceiling.
    struct BlockingCleanupReader {
        inputs: std::path::PathBuf,
        reads: usize,
    }

    impl AsyncRead for BlockingCleanupReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.reads == 1 {
                for entry in std::fs::read_dir(&self.inputs)? {
                    let path = entry?.path();
                    std::fs::remove_file(&path)?;
                    std::fs::create_dir(&path)?;
                    std::fs::write(path.join("pinned"), b"x")?;
                }
            }
            self.reads += 1;
            let n = buf.remaining();
            buf.put_slice(&vec![1u8; n]);
            std::task::Poll::Ready(Ok(()))
        }
    }

    /// Yields a few bytes and then fails, like a dropped client connection.
    fn disconnecting_reader() -> impl AsyncRead + Send {
        let ok: &'static [u8] = b"partial";
        let failing = FailingReader;
        ok.chain(failing)
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "client went away",
            )))
        }
    }
}
