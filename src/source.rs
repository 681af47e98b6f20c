//! Source image acquisition.
//!
//! The source identifier is an http(s) URL, a `file://` URL or a plain
//! path. [`Downloader`] copies it into the work directory once per run;
//! every operation then reopens that local copy.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source unavailable: {identifier}: {reason}")]
    Unavailable { identifier: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SourceError {
    pub fn unavailable(identifier: &str, reason: impl ToString) -> Self {
        SourceError::Unavailable {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Resolves a source identifier to a readable local file.
pub trait SourceProvider {
    fn fetch(&self, identifier: &str, work_dir: &Path) -> Result<PathBuf, SourceError>;
}

/// Last path segment of `identifier`, without query string or fragment.
///
/// ```
/// use image_worker::source::source_filename;
/// assert_eq!(source_filename("https://cdn.example.com/a/poster.jpg?v=3"), "poster.jpg");
/// assert_eq!(source_filename("/tmp/photo.png"), "photo.png");
/// ```
pub fn source_filename(identifier: &str) -> &str {
    let end = identifier.find(['?', '#']).unwrap_or(identifier.len());
    let path = identifier[..end].trim_end_matches('/');
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn is_http(identifier: &str) -> bool {
    let lower = identifier.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn local_path(identifier: &str) -> &Path {
    Path::new(identifier.strip_prefix("file://").unwrap_or(identifier))
}

/// Fetches http(s) sources with `ureq` and copies local ones.
///
/// With `offline` set nothing is downloaded: local sources are used in
/// place and remote ones fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Downloader {
    pub offline: bool,
}

impl Downloader {
    pub fn new(offline: bool) -> Self {
        Self { offline }
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), SourceError> {
        log::info!("downloading {url}");
        let response = ureq::get(url)
            .call()
            .map_err(|e| SourceError::unavailable(url, e))?;
        let mut reader = response.into_reader();
        let mut file = fs::File::create(dest).map_err(|e| SourceError::unavailable(url, e))?;
        io::copy(&mut reader, &mut file).map_err(|e| SourceError::unavailable(url, e))?;
        Ok(())
    }
}

impl SourceProvider for Downloader {
    fn fetch(&self, identifier: &str, work_dir: &Path) -> Result<PathBuf, SourceError> {
        let filename = source_filename(identifier);
        if filename.is_empty() {
            return Err(SourceError::unavailable(identifier, "no file name in identifier"));
        }

        if is_http(identifier) {
            if self.offline {
                return Err(SourceError::unavailable(
                    identifier,
                    "network access is disabled",
                ));
            }
            fs::create_dir_all(work_dir)?;
            let dest = work_dir.join(filename);
            self.download(identifier, &dest)?;
            return Ok(dest);
        }

        let path = local_path(identifier);
        if !path.is_file() {
            return Err(SourceError::unavailable(identifier, "no such file"));
        }
        if self.offline {
            return Ok(path.to_path_buf());
        }
        fs::create_dir_all(work_dir)?;
        let dest = work_dir.join(filename);
        let unavailable = |e: io::Error| SourceError::unavailable(identifier, e);
        let in_place = fs::canonicalize(path).map_err(unavailable)?
            == fs::canonicalize(work_dir).map_err(unavailable)?.join(filename);
        if !in_place {
            fs::copy(path, &dest).map_err(unavailable)?;
        }
        log::debug!("source copied to {}", dest.display());
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filename_strips_query_and_fragment() {
        assert_eq!(source_filename("https://x.test/a/b/poster.jpg"), "poster.jpg");
        assert_eq!(source_filename("https://x.test/poster.jpg?sig=abc&x=1"), "poster.jpg");
        assert_eq!(source_filename("https://x.test/poster.jpg#top"), "poster.jpg");
        assert_eq!(source_filename("file:///tmp/in.png"), "in.png");
        assert_eq!(source_filename("in.png"), "in.png");
        assert_eq!(source_filename("https://x.test/dir/"), "dir");
        assert_eq!(source_filename(""), "");
    }

    #[test]
    fn local_file_is_copied_into_work_dir() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("poster.jpg");
        fs::write(&src, b"bytes").unwrap();
        let work = tmp.path().join("work");

        let fetched = Downloader::new(false)
            .fetch(src.to_str().unwrap(), &work)
            .unwrap();
        assert_eq!(fetched, work.join("poster.jpg"));
        assert_eq!(fs::read(&fetched).unwrap(), b"bytes");
    }

    #[test]
    fn file_url_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("poster.jpg");
        fs::write(&src, b"bytes").unwrap();
        let id = format!("file://{}", src.display());

        let fetched = Downloader::new(false).fetch(&id, &tmp.path().join("w")).unwrap();
        assert!(fetched.exists());
    }

    #[test]
    fn source_already_in_work_dir_is_kept() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("poster.jpg");
        fs::write(&src, b"bytes").unwrap();

        let fetched = Downloader::new(false)
            .fetch(src.to_str().unwrap(), tmp.path())
            .unwrap();
        assert_eq!(fs::read(fetched).unwrap(), b"bytes");
    }

    #[test]
    fn offline_uses_local_file_in_place() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("poster.jpg");
        fs::write(&src, b"bytes").unwrap();

        let fetched = Downloader::new(true)
            .fetch(src.to_str().unwrap(), &tmp.path().join("w"))
            .unwrap();
        assert_eq!(fetched, src);
        assert!(!tmp.path().join("w").exists());
    }

    #[test]
    fn offline_refuses_remote_source() {
        let tmp = TempDir::new().unwrap();
        let err = Downloader::new(true)
            .fetch("https://cdn.example.com/poster.jpg", tmp.path())
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert!(err.to_string().contains("network access is disabled"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_local_file_is_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("poster.jpg");
        fs::write(&src, b"bytes").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&src).is_ok() {
            // Running as root: permissions are not enforced.
            return;
        }

        let err = Downloader::new(false)
            .fetch(src.to_str().unwrap(), &tmp.path().join("w"))
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn missing_local_file_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.jpg");
        let err = Downloader::new(false)
            .fetch(missing.to_str().unwrap(), tmp.path())
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
