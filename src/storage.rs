//! Crash-safe whole-file persistence.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use getrandom::fill;

use crate::error::{Error, Result};

/// A file that is only ever replaced as a whole.
///
/// Writes go to a randomly named sibling, are fsynced, and are then renamed
/// over the target, so readers see either the old or the new content.
#[derive(Debug, Clone)]
pub struct AtomicFile {
    path: PathBuf,
}

impl AtomicFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    /// Replaces the file content, creating parent directories as needed.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path()?;
        let mut tmp = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
        drop(tmp);

        if let Err(e) = self.replace_with(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.parent() {
            File::open(parent)?.sync_all()?;
        }
        tracing::debug!(path = %self.path.display(), bytes = data.len(), "wrote file");

        Ok(())
    }

    fn parent(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// `.<name>.<hex>.tmp` next to the target so the rename stays on one
    /// filesystem.
    fn tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        fill(&mut buf).map_err(|_| Error::Random)?;
        let suffix: String = buf.iter().map(|b| format!("{b:02x}")).collect();

        let name = self
            .path
            .file_name()
            .ok_or_else(|| Error::validation("output path has no file name"))?
            .to_string_lossy();

        Ok(self.path.with_file_name(format!(".{name}.{suffix}.tmp")))
    }

    #[cfg(target_os = "windows")]
    fn replace_with(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{
            MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, MoveFileExW,
        };

        fn wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let from = wide(tmp_path.as_os_str());
        let to = wide(self.path.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call.
        let ok = unsafe {
            MoveFileExW(
                from.as_ptr(),
                to.as_ptr(),
                MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
            )
        };
        if ok == 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    fn replace_with(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}
