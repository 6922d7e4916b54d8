//! Utility functions: input enumeration, output validation, time formatting

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// List the JPEG images directly inside `folder`, sorted by filename.
///
/// Non-recursive, case-insensitive on the `.jpg`/`.jpeg` extension; the
/// sort keeps the upload order deterministic across runs.
pub fn list_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(folder).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read photo folder '{}': {}", folder.display(), e),
        ))
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(Error::Io)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(ext) = path.extension() {
            let ext = ext.to_string_lossy().to_lowercase();
            if ext == "jpg" || ext == "jpeg" {
                images.push(path);
            }
        }
    }

    images.sort();
    Ok(images)
}

/// Whether `path` is usable as an output directory: absolute, not an
/// existing file, and with a parent writable by the effective user.
pub fn validate_output_dir(path: &Path) -> bool {
    if !path.is_absolute() || path.is_file() {
        return false;
    }
    let Some(parent) = path.parent() else {
        return false;
    };
    is_writable(parent)
}

/// Whether the effective user can write to `path`
#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: cpath is a valid NUL-terminated string for the duration of
    // the call, and access() does not retain the pointer
    unsafe { libc::access(cpath.as_ptr(), libc::W_OK) == 0 }
}

/// Whether the effective user can write to `path`.
///
/// Without access(2) this falls back to the file-mode write bits, which
/// ignore ownership; a false positive here is caught later as a storage
/// failure during retrieval.
#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

/// Format a millisecond duration for elapsed-time reporting.
///
/// Buckets: `1d 2h 3m 4s`, `2h 3m 4s`, `3m 4s`, or `4s 500ms`.
pub fn fmt_elapsed_time(ms: u64) -> String {
    let total_secs = ms / 1000;
    let days = total_secs / 86_400;
    let hours = total_secs % 86_400 / 3_600;
    let minutes = total_secs % 3_600 / 60;
    let secs = total_secs % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, secs)
    } else if total_secs >= 3_600 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if total_secs >= 60 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s {}ms", secs, ms % 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_elapsed_time_buckets() {
        assert_eq!(fmt_elapsed_time(4_500), "4s 500ms");
        assert_eq!(fmt_elapsed_time(184_000), "3m 4s");
        assert_eq!(fmt_elapsed_time(7_384_000), "2h 3m 4s");
        assert_eq!(fmt_elapsed_time(93_784_000), "1d 2h 3m 4s");
        assert_eq!(fmt_elapsed_time(0), "0s 0ms");
    }

    #[test]
    fn list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.jpg", "c.jpeg", "notes.txt", "d.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let images = list_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.JPG", "c.jpeg"]);
    }

    #[test]
    fn list_images_missing_folder_is_io_error() {
        let err = list_images(Path::new("/no/such/folder")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn validate_output_dir_rules() {
        let dir = tempfile::tempdir().unwrap();

        // Relative paths are rejected
        assert!(!validate_output_dir(Path::new("relative/out")));

        // An existing file is not a directory
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        assert!(!validate_output_dir(&file));

        // A fresh subdirectory of a writable parent is fine
        assert!(validate_output_dir(&dir.path().join("results")));

        // A path whose parent does not exist is rejected
        assert!(!validate_output_dir(&dir.path().join("missing/results")));
    }

    #[cfg(unix)]
    #[test]
    fn validate_output_dir_checks_effective_user_access() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("locked");
        std::fs::create_dir(&parent).unwrap();

        // Mode bits say r-x for everyone, including the owner
        std::fs::set_permissions(&parent, std::fs::Permissions::from_mode(0o555)).unwrap();
        let target = parent.join("results");

        // root bypasses mode bits, so the rejection is only observable
        // for an unprivileged user
        if unsafe { libc::geteuid() } != 0 {
            assert!(!validate_output_dir(&target));
        }

        std::fs::set_permissions(&parent, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(validate_output_dir(&target));
    }
}
