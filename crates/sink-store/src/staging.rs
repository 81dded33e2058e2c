//! Local-disk or in-memory byte accumulation per open file (C6, §4.6).
//! Durable across a single task lifetime; reclaimable once committed.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use sink_core::error::{Result, SinkError};
use uuid::Uuid;

/// Where bytes for an in-flight `OpenFile` live before the object is
/// committed. `BuildLocal` is a disk file read back on commit; the
/// uploader is expected to drive `Streamed` itself via multipart calls
/// directly against the store client, so this enum only models what
/// C7 needs from the staging layer: a place to accumulate bytes and a
/// `take()` to hand them to the uploader.
pub enum Stage {
    BuildLocal { path: PathBuf, file: std::fs::File },
    Streamed { buffer: Vec<u8> },
}

impl Stage {
    pub fn build_local(tmp_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(tmp_dir)
            .map_err(|e| SinkError::StageCorruption(format!("cannot create tmp dir: {e}")))?;
        let path = tmp_dir.join(format!("s3sink-{}.stage", Uuid::new_v4()));
        let file = std::fs::File::create(&path)
            .map_err(|e| SinkError::StageCorruption(format!("cannot create stage file: {e}")))?;
        Ok(Stage::BuildLocal { path, file })
    }

    pub fn streamed() -> Self {
        Stage::Streamed { buffer: Vec::new() }
    }

    /// Append bytes written by a format writer's delta since the last
    /// call. Detects the "deleted externally" failure mode (§4.6) by
    /// surfacing the underlying I/O error as `StageCorruption`, which
    /// the writer manager treats as locally recoverable: drop this
    /// `OpenFile`, keep processing.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            // A file descriptor kept open across an `unlink` of its path
            // still writes fine on POSIX; the path itself going missing
            // is what "deleted externally" means here, so that's what
            // gets checked before trusting the write.
            Stage::BuildLocal { file, path } => {
                if !path.exists() {
                    return Err(SinkError::StageCorruption(format!(
                        "stage file {} no longer exists",
                        path.display()
                    )));
                }
                file.write_all(bytes).map_err(|e| {
                    SinkError::StageCorruption(format!("stage file {} unwritable: {e}", path.display()))
                })
            }
            Stage::Streamed { buffer } => {
                buffer.extend_from_slice(bytes);
                Ok(())
            }
        }
    }

    /// Read back the full contents for upload, leaving the stage in
    /// place until the caller explicitly discards it with `cleanup`.
    pub fn contents(&mut self) -> Result<Vec<u8>> {
        match self {
            Stage::BuildLocal { path, file } => {
                use std::io::{Read, Seek, SeekFrom};
                file.flush().map_err(|e| {
                    SinkError::StageCorruption(format!("stage file {} flush failed: {e}", path.display()))
                })?;
                let mut buf = Vec::new();
                file.seek(SeekFrom::Start(0)).map_err(|e| {
                    SinkError::StageCorruption(format!("stage file {} seek failed: {e}", path.display()))
                })?;
                file.read_to_end(&mut buf).map_err(|e| {
                    SinkError::StageCorruption(format!("stage file {} read failed: {e}", path.display()))
                })?;
                Ok(buf)
            }
            Stage::Streamed { buffer } => Ok(buffer.clone()),
        }
    }

    pub fn cleanup(&self) {
        if let Stage::BuildLocal { path, .. } = self {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove stage file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_local_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = Stage::build_local(dir.path()).unwrap();
        stage.write_all(b"hello ").unwrap();
        stage.write_all(b"world").unwrap();
        let bytes = stage.contents().unwrap();
        assert_eq!(bytes, b"hello world");
        stage.cleanup();
    }

    #[test]
    fn streamed_accumulates_in_memory() {
        let mut stage = Stage::streamed();
        stage.write_all(b"abc").unwrap();
        stage.write_all(b"def").unwrap();
        assert_eq!(stage.contents().unwrap(), b"abcdef");
    }

    #[test]
    fn deleted_stage_file_surfaces_as_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = Stage::build_local(dir.path()).unwrap();
        if let Stage::BuildLocal { path, .. } = &stage {
            std::fs::remove_file(path).unwrap();
        }
        let err = stage.write_all(b"x").unwrap_err();
        assert!(err.is_recoverable_locally());
    }
}
