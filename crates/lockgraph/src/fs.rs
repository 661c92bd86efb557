//! Reading and writing lock documents on disk.

use crate::codec::{self, FormatError};
use crate::model::LockDocument;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when reading or writing a document file.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Format(#[from] FormatError),
}

impl DocumentError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Bounded retry for opening a file that another process may be rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub retries: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Fail on the first error.
    pub const NONE: Self = Self {
        retries: 0,
        delay: Duration::ZERO,
    };

    #[must_use]
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Open a file for reading, retrying transient failures.
///
/// A missing file is reported at once.
///
/// # Errors
///
/// Returns the last I/O error once the retries are exhausted.
pub fn open_with_retry(path: &Path, policy: &RetryPolicy) -> io::Result<File> {
    retry(path, policy, || File::open(path))
}

/// Run `attempt` until it succeeds, fails with `NotFound`, or `policy` runs out.
fn retry<T>(
    path: &Path,
    policy: &RetryPolicy,
    mut attempt: impl FnMut() -> io::Result<T>,
) -> io::Result<T> {
    let mut remaining = policy.retries;
    loop {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == io::ErrorKind::NotFound || remaining == 0 => return Err(e),
            Err(e) => {
                remaining -= 1;
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    remaining,
                    "failed to open file, retrying"
                );
                thread::sleep(policy.delay);
            }
        }
    }
}

/// Read the whole file through [`open_with_retry`].
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn read_bytes(path: &Path, policy: &RetryPolicy) -> Result<Vec<u8>, DocumentError> {
    let mut file = open_with_retry(path, policy).map_err(|e| DocumentError::io(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| DocumentError::io(path, e))?;
    Ok(bytes)
}

/// Read and decode a lock document.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid document.
/// Format errors carry `path`.
pub fn read_document(path: &Path, policy: &RetryPolicy) -> Result<LockDocument, DocumentError> {
    let bytes = read_bytes(path, policy)?;
    let document = codec::decode(&bytes).map_err(|e| e.with_path(path))?;
    tracing::debug!(
        path = %path.display(),
        version = document.format_version,
        targets = document.targets.len(),
        "read lock document"
    );
    Ok(document)
}

/// Encode a document and write it to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns an error if the document cannot be encoded or the file cannot be written.
pub fn write_document(path: &Path, document: &LockDocument) -> Result<(), DocumentError> {
    write_bytes(path, &codec::encode(document)?)
}

/// Write raw bytes to `path`, clearing a read-only flag on an existing file first.
///
/// # Errors
///
/// Returns an error if the file cannot be made writable or written.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), DocumentError> {
    if path.exists() {
        make_writable(path).map_err(|e| DocumentError::io(path, e))?;
    }
    fs::write(path, bytes).map_err(|e| DocumentError::io(path, e))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote document");
    Ok(())
}

/// Clear the read-only flag of an existing file.
///
/// # Errors
///
/// Returns an error if the permissions cannot be read or updated.
pub fn make_writable(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    if !permissions.readonly() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }

    fs::set_permissions(path, permissions)
}
