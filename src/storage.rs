//! Snapshot storage.
//!
//! Two flat files, one DID per line: `pending` and `added`. Loading streams
//! the file line by line; saving writes a sibling temp file and renames it
//! over the target so a crash mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::Did;

pub const DEFAULT_PENDING_FILE: &str = "./pending.txt";
pub const DEFAULT_ADDED_FILE: &str = "./added.txt";

/// Read a snapshot. `Ok(None)` means no snapshot exists.
///
/// A final line without a newline is kept. Blank lines are ignored and
/// lines that are not valid identifiers (or not UTF-8) are logged and
/// skipped.
pub async fn load(path: &Path) -> Result<Option<Vec<Did>>> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::Persistence {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut ids = Vec::new();
    let mut line_no = 0usize;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|source| Error::Persistence {
                path: path.to_path_buf(),
                source,
            })?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(path = %path.display(), line = line_no, "skipping non-UTF-8 snapshot line");
            continue;
        };
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }
        match Did::parse(line) {
            Ok(did) => ids.push(did),
            Err(e) => warn!(path = %path.display(), line = line_no, "skipping snapshot line: {e}"),
        }
    }

    debug!(path = %path.display(), count = ids.len(), "snapshot loaded");
    Ok(Some(ids))
}

/// Overwrite a snapshot with `ids`, newline-joined.
pub async fn save(path: &Path, ids: &[Did]) -> Result<()> {
    let tmp = temp_path(path);
    {
        let mut out = BufWriter::new(File::create(&tmp).await?);
        for (i, did) in ids.iter().enumerate() {
            if i > 0 {
                out.write_all(b"\n").await?;
            }
            out.write_all(did.as_str().as_bytes()).await?;
        }
        out.flush().await?;
        out.get_ref().sync_all().await?;
    }
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), count = ids.len(), "snapshot saved");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// One snapshot file with its own write lock.
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<Vec<Did>>> {
        let _guard = self.lock.lock().await;
        load(&self.path).await
    }

    /// Saves to the same file never interleave.
    pub async fn save(&self, ids: &[Did]) -> Result<()> {
        let _guard = self.lock.lock().await;
        save(&self.path, ids).await
    }
}

/// The pair of snapshot files describing queue state.
#[derive(Debug)]
pub struct SnapshotStore {
    pub pending: SnapshotFile,
    pub added: SnapshotFile,
}

impl SnapshotStore {
    pub fn new(pending: impl Into<PathBuf>, added: impl Into<PathBuf>) -> Self {
        Self {
            pending: SnapshotFile::new(pending),
            added: SnapshotFile::new(added),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_FILE, DEFAULT_ADDED_FILE)
    }
}
