//! On-disk blob storage for file records.
//!
//! Each blob is a single flat file at `{root}/{name}`. Writes are sequential
//! appends; reads hand out chunks of at most `chunk_size` bytes. Names must
//! be a single path segment; the handler layer generates them (UUIDs) and
//! never accepts caller-supplied paths.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("file exists")]
    AlreadyExists,
    #[error("file not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Owns the storage root and the chunk size used for reads.
pub struct BlobStore {
    root: PathBuf,
    chunk_size: usize,
}

impl BlobStore {
    /// Create the store, creating the root directory if needed.
    pub async fn new(root: impl Into<PathBuf>, chunk_size: usize) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!("blob storage root: {}", root.display());
        Ok(Self { root, chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Create a fresh blob and open it for append. Fails if a blob with the
    /// same name already exists.
    pub async fn create(&self, name: &str) -> Result<BlobHandle, BlobError> {
        let path = self.path_of(name);
        let file = fs::OpenOptions::new()
            .write(true)
            .append(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => BlobError::AlreadyExists,
                _ => BlobError::Io(e),
            })?;
        Ok(BlobHandle {
            file,
            path,
            chunk_size: self.chunk_size,
        })
    }

    /// Open an existing blob for chunk-wise reading.
    pub async fn open(&self, name: &str) -> Result<BlobHandle, BlobError> {
        let path = self.path_of(name);
        let file = fs::File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BlobError::NotFound,
            _ => BlobError::Io(e),
        })?;
        Ok(BlobHandle {
            file,
            path,
            chunk_size: self.chunk_size,
        })
    }

    /// Delete a blob. A blob that is already gone is not an error.
    pub async fn remove(&self, name: &str) -> Result<(), BlobError> {
        let path = self.path_of(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("blob {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// An open blob. A handle belongs to exactly one in-flight RPC; it is not
/// safe to share across writers.
pub struct BlobHandle {
    file: fs::File,
    path: PathBuf,
    chunk_size: usize,
}

impl BlobHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `buf` and return the number of bytes written.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, BlobError> {
        self.file.write_all(buf).await?;
        Ok(buf.len())
    }

    /// Read the next chunk of at most `chunk_size` bytes. `None` marks end
    /// of stream.
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, BlobError> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    /// Flush buffered writes and release the OS resource.
    pub async fn close(mut self) -> Result<(), BlobError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}
