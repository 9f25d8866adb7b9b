//! Crash-safe file replacement
//!
//! A write is staged into a sibling temp file and synced, then renamed over the
//! target, then the directory entry is synced. Until the rename the target keeps
//! its previous bytes; after it the target holds the new bytes. Dropping a
//! [`StagedWrite`] without committing removes the temp file.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// New content for `target` that has reached stable storage but is not yet visible
#[derive(Debug)]
pub struct StagedWrite {
    target: PathBuf,
    tmp: NamedTempFile,
}

impl StagedWrite {
    /// The file this write will replace
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The temp file currently holding the staged bytes
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Makes the staged content visible under the target name
    pub fn commit(self) -> io::Result<()> {
        let dir = parent_dir(&self.target).to_path_buf();
        self.tmp.persist(&self.target).map_err(|e| e.error)?;
        sync_dir(&dir)
    }
}

/// Writes `contents` to a temp file next to `target` and syncs it
pub fn stage(target: &Path, contents: &[u8]) -> io::Result<StagedWrite> {
    let dir = parent_dir(target);
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    Ok(StagedWrite {
        target: target.to_path_buf(),
        tmp,
    })
}

/// Atomically replaces `target` with `contents`
pub fn atomic_write(target: &Path, contents: &[u8]) -> io::Result<()> {
    stage(target, contents)?.commit()
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directory handles cannot be synced on this platform; the rename is still atomic.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Appends one line to `path`, creating it if needed, and syncs the data
///
/// A tail left without a newline by an earlier failed append is closed off
/// first, so the new line always starts on a line of its own. On failure the
/// file is truncated back to its previous length.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let prev_len = file.metadata()?.len();

    let mut buf = String::with_capacity(line.len() + 2);
    if prev_len > 0 && !ends_with_newline(&mut file, prev_len)? {
        buf.push('\n');
    }
    buf.push_str(line);
    buf.push('\n');

    let result = file.write_all(buf.as_bytes()).and_then(|()| file.sync_data());
    if let Err(e) = result {
        if let Err(truncate) = file.set_len(prev_len) {
            tracing::warn!("Failed to roll back {}: {}", path.display(), truncate);
        }
        return Err(e);
    }
    Ok(())
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
