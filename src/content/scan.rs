//! Recursive walk of the content root.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ContentError, Result};

use super::mime::guess_content_type;
use super::path::relative_path;

/// A file to publish as a bucket object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    /// Object key: path relative to the content root with `/` separators.
    pub key: String,
    /// Absolute or root-joined path of the file on disk.
    pub source: PathBuf,
    /// Inferred MIME type.
    pub content_type: String,
    /// Hex SHA-256 of the file contents; `None` if the file could not be read.
    pub digest: Option<String>,
    /// Size in bytes; `None` if the file could not be read.
    pub size: Option<u64>,
}

impl ContentFile {
    /// Returns true if the contents were read and digested.
    #[must_use]
    pub const fn is_readable(&self) -> bool {
        self.digest.is_some()
    }

    /// The source path as the engine should see it.
    ///
    /// With a `base` directory, the path is made relative to it, so the same
    /// layout renders identically wherever the project is checked out.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not valid UTF-8.
    pub fn source_from(&self, base: Option<&Path>) -> Result<String> {
        let path = match base {
            Some(base) => relative_path(base, &self.source),
            None => self.source.clone(),
        };

        path.to_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ContentError::NonUtf8Path {
                    path: self.source.clone(),
                }
                .into()
            })
    }
}

/// Enumerates the files under a content root.
#[derive(Debug)]
pub struct ContentScanner {
    root: PathBuf,
}

impl ContentScanner {
    /// Creates a scanner for `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the content root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the content root and returns every regular file, sorted by key.
    ///
    /// Symlinks that resolve to files are included; directories are not
    /// followed through links. A file whose contents cannot be read is still
    /// returned, without a digest, so only its own upload fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing, a directory cannot be listed,
    /// a path is not valid UTF-8, or two paths normalize to the same key.
    pub fn scan(&self) -> Result<Vec<ContentFile>> {
        if !self.root.is_dir() {
            return Err(ContentError::RootNotFound {
                path: self.root.clone(),
            }
            .into());
        }

        info!("Scanning content root: {}", self.root.display());

        let mut files: BTreeMap<String, ContentFile> = BTreeMap::new();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| ContentError::Unreadable {
                path: e.path().map_or_else(|| self.root.clone(), Path::to_path_buf),
                message: e.to_string(),
            })?;

            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }

            let path = entry.path();
            let key = object_key(&self.root, path)?;
            let content_type = guess_content_type(path);
            let (digest, size) = match digest_file(path) {
                Ok((digest, size)) => {
                    debug!("Found {key} ({content_type}, {size} bytes)");
                    (Some(digest), Some(size))
                }
                Err(e) => {
                    warn!("{e}; {key} is declared without a content digest");
                    (None, None)
                }
            };

            let file = ContentFile {
                key: key.clone(),
                source: path.to_path_buf(),
                content_type,
                digest,
                size,
            };

            if files.insert(key.clone(), file).is_some() {
                return Err(ContentError::DuplicateKey { key }.into());
            }
        }

        info!("Found {} files to publish", files.len());
        Ok(files.into_values().collect())
    }
}

/// Derives the object key of `path` relative to `root`.
fn object_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|e| ContentError::Unreadable {
        path: path.to_path_buf(),
        message: format!("not under content root: {e}"),
    })?;

    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ContentError::NonUtf8Path {
            path: path.to_path_buf(),
        })?;

    Ok(parts.join("/"))
}

/// Streams the file through SHA-256.
fn digest_file(path: &Path) -> Result<(String, u64)> {
    let unreadable = |e: std::io::Error| ContentError::Unreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut file = std::fs::File::open(path).map_err(unreadable)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut size = 0u64;

    loop {
        let read = file.read(&mut buffer).map_err(unreadable)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok((hex::encode(hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_keys_match_relative_paths() {
        let temp = TempDir::new().unwrap();
        let expected = [
            "index.html",
            "error.html",
            "css/site.css",
            "assets/img/logo.png",
            "LICENSE",
        ];
        for file in expected {
            write(temp.path(), file, file);
        }
        std::fs::create_dir_all(temp.path().join("empty/dir")).unwrap();

        let files = ContentScanner::new(temp.path()).scan().unwrap();
        let keys: BTreeSet<&str> = files.iter().map(|f| f.key.as_str()).collect();

        assert_eq!(files.len(), expected.len());
        assert_eq!(keys, expected.into_iter().collect());
    }

    #[test]
    fn test_sorted_by_key_with_types() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.js", "console.log(1)");
        write(temp.path(), "a/index.html", "<html></html>");
        write(temp.path(), "c", "raw");

        let files = ContentScanner::new(temp.path()).scan().unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, ["a/index.html", "b.js", "c"]);
        assert_eq!(files[0].content_type, "text/html");
        assert_eq!(files[2].content_type, "application/octet-stream");
    }

    #[test]
    fn test_digest_tracks_content() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.html", "v1");
        let first = ContentScanner::new(temp.path()).scan().unwrap();

        write(temp.path(), "index.html", "v2");
        let second = ContentScanner::new(temp.path()).scan().unwrap();

        assert_eq!(first[0].size, Some(2));
        assert_ne!(first[0].digest, second[0].digest);
        assert_eq!(first[0].digest.as_ref().map(String::len), Some(64));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_kept_without_digest() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.html", "ok");
        write(temp.path(), "secret.html", "hidden");
        let secret = temp.path().join("secret.html");
        std::fs::set_permissions(&secret, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits; nothing to observe then.
        if std::fs::File::open(&secret).is_ok() {
            return;
        }

        let files = ContentScanner::new(temp.path()).scan().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].is_readable());
        assert_eq!(files[1].key, "secret.html");
        assert!(!files[1].is_readable());
        assert_eq!(files[1].size, None);
        assert_eq!(files[1].content_type, "text/html");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"bad\xffname.html");
        if std::fs::write(temp.path().join(name), "x").is_err() {
            // Filesystem refuses non-UTF-8 names.
            return;
        }

        let err = ContentScanner::new(temp.path()).scan().unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"), "got: {err}");
    }

    #[test]
    fn test_source_relative_to_base() {
        let file = ContentFile {
            key: String::from("css/site.css"),
            source: PathBuf::from("/work/shop/www/css/site.css"),
            content_type: String::from("text/css"),
            digest: None,
            size: None,
        };

        assert_eq!(
            file.source_from(Some(Path::new("/work/shop/.edgesite/stack"))).unwrap(),
            "../../www/css/site.css"
        );
        assert_eq!(file.source_from(None).unwrap(), "/work/shop/www/css/site.css");
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = ContentScanner::new(temp.path().join("nope")).scan().unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_empty_root() {
        let temp = TempDir::new().unwrap();
        let files = ContentScanner::new(temp.path()).scan().unwrap();
        assert!(files.is_empty());
    }
}
