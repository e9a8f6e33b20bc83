//! Shared utility functions for the proofloop crate.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Extract the first complete JSON object from text that may contain other content.
///
/// Each `{` is tried as the start of an object in turn, so braces in the
/// surrounding prose or inside string values do not confuse the match.
pub fn extract_json_object(text: &str) -> Option<String> {
    for (start, _) in text.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        if let Some(Ok(serde_json::Value::Object(_))) = stream.next() {
            let end = start + stream.byte_offset();
            return Some(text[start..end].to_string());
        }
    }
    None
}

/// Replace `path` with `contents` so that readers observe either the old file or
/// the new one, never a partial write.
///
/// The bytes go to a sibling temp file which is fsynced and renamed over the
/// destination; the parent directory is synced afterwards on Unix.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    atomic_write_with(path, contents, |file, bytes| file.write_all(bytes))
}

/// Same as [`atomic_write`] with the payload write delegated to `write`.
///
/// On any failure the temp file is removed and the destination is untouched.
pub(crate) fn atomic_write_with<F>(path: &Path, contents: &[u8], write: F) -> io::Result<()>
where
    F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
{
    let tmp_path = temp_path_for(path);

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        write(&mut file, contents)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, path)?;
        sync_parent_dir(path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Keep at most the last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max_chars).collect();
    format!("[... {} chars truncated]\n{}", count - max_chars, skipped)
}

/// Quote a string for POSIX `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
