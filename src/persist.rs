//! Atomic file replacement for timing tables, status records and sliced inputs.

use std::fs;
use std::io;
use std::path::Path;

use uuid::Uuid;

/// Write `contents` to a sibling temp file, then rename it over `path`.
/// Readers see either the previous file or the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    fs::write(&tmp, contents)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

/// Removes a file when dropped. Used for scratch files that must not outlive a sweep.
#[derive(Debug)]
pub struct RemoveOnDrop<'a>(pub &'a Path);

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        if self.0.exists() {
            let _ = fs::remove_file(self.0);
        }
    }
}
