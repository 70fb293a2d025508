//! Key directory on the local filesystem.
//!
//! Every write goes to a uniquely named temporary file in the target
//! directory and is renamed over the destination, so a concurrent reader
//! sees either the old file or the new one, never a torn mix.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use kryptr_common::{Error, Result};

/// Directory holding key material.
#[derive(Debug, Clone)]
pub struct KeyDirectory {
    root: PathBuf,
}

impl KeyDirectory {
    /// Wrap a directory path. Nothing is created until the first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file in the directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether a file exists in the directory.
    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Create the directory, owner-only on Unix.
    ///
    /// # Errors
    /// - `Io` if the directory cannot be created or restricted
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.root.is_dir() {
            debug!(dir = %self.root.display(), "Creating key directory");
            fs::create_dir_all(&self.root)?;
        }
        set_restrictive_permissions(&self.root, 0o700)
    }

    /// Read a file from the directory.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    /// - `Io` if it cannot be read
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path(name);
        if !path.is_file() {
            return Err(Error::NotFound(format!("{} not found", path.display())));
        }
        Ok(fs::read(&path)?)
    }

    /// Atomically replace a file in the directory.
    pub fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        write_atomic(&self.path(name), data)
    }

    /// Replace several files as one batch.
    ///
    /// Every file is staged and synced before the first rename, so a
    /// failed write leaves all existing files untouched. The renames then
    /// run back to back in the given order; only a failing rename, after
    /// staging succeeded, can leave the batch partly applied.
    ///
    /// # Errors
    /// - `Io` if staging or renaming fails
    pub fn write_batch(&self, files: &[(&str, &[u8])]) -> Result<()> {
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());

        for (name, data) in files {
            let target = self.path(name);
            match stage(&target, data) {
                Ok(tmp) => staged.push((tmp, target)),
                Err(e) => {
                    discard(staged.iter().map(|(tmp, _)| tmp.as_path()));
                    return Err(e);
                }
            }
        }

        for (i, (tmp, target)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, target) {
                discard(staged[i..].iter().map(|(tmp, _)| tmp.as_path()));
                return Err(e.into());
            }
        }

        sync_dir(&self.root)
    }
}

/// Atomically write `data` to `path` with owner-only permissions.
///
/// # Postconditions
/// - On success `path` holds exactly `data`, and the rename is synced to
///   the parent directory
/// - On failure `path` is untouched and no temporary file is left behind
///
/// # Errors
/// - `Io` if the temporary file cannot be written or renamed
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = stage(path, data)?;

    if let Err(e) = fs::rename(&tmp_path, path) {
        discard([tmp_path.as_path()]);
        return Err(e.into());
    }

    sync_dir(parent_dir(path))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Write `data` to a fresh temporary file next to `path`.
fn stage(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", path.display())))?;

    let tmp_path = parent_dir(path).join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    if let Err(e) = write_new_file(&tmp_path, data) {
        discard([tmp_path.as_path()]);
        return Err(e);
    }
    Ok(tmp_path)
}

fn discard<'a>(paths: impl IntoIterator<Item = &'a Path>) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}

fn write_new_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file: File = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

/// Persist directory entries, so completed renames survive a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
