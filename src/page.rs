use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::{Error, Result};

pub const SOURCE_SUFFIX: &str = ".md";

/// A Markdown source and the man page generated from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl Page {
    pub fn from_source<P: Into<PathBuf>>(source: P) -> Option<Page> {
        let source = source.into();
        let target = target_path(&source)?;
        Some(Page { source, target })
    }

    /// Same test `make` uses: rebuild when the target is missing or older
    /// than its source.
    pub fn is_stale(&self) -> Result<bool> {
        let target_modified = match fs::metadata(&self.target) {
            Ok(meta) => meta.modified().map_err(|e| Error::io(&self.target, e))?,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(Error::io(&self.target, e)),
        };
        let source_modified = fs::metadata(&self.source)
            .and_then(|meta| meta.modified())
            .map_err(|e| Error::io(&self.source, e))?;
        Ok(source_modified > target_modified)
    }
}

/// `foo.1.md` -> `foo.1`, in the same directory.
///
/// `None` when the file name lacks the suffix or would be left empty.
pub fn target_path(source: &Path) -> Option<PathBuf> {
    let stem = strip_suffix(source.file_name()?)?;
    if stem.is_empty() {
        return None;
    }
    Some(source.with_file_name(stem))
}

#[cfg(unix)]
fn strip_suffix(name: &OsStr) -> Option<&OsStr> {
    use std::os::unix::ffi::OsStrExt;

    name.as_bytes()
        .strip_suffix(SOURCE_SUFFIX.as_bytes())
        .map(OsStr::from_bytes)
}

#[cfg(not(unix))]
fn strip_suffix(name: &OsStr) -> Option<&OsStr> {
    match name.to_str() {
        Some(name) => name.strip_suffix(SOURCE_SUFFIX).map(OsStr::new),
        None => {
            debug!("skipping non-UTF-8 name {:?}", name);
            None
        }
    }
}

/// Lists the pages in `dir`, sorted by source path. Not cached: every call
/// reads the directory again. Dotfiles are skipped, as a `*.md` glob would.
pub fn discover(dir: &Path) -> Result<Vec<Page>> {
    let mut pages = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        // follows symlinks, a linked source is still a source
        if !path.is_file() {
            continue;
        }
        if let Some(page) = Page::from_source(path) {
            pages.push(page);
        }
    }
    pages.sort_by(|a, b| a.source.cmp(&b.source));
    debug!("found {} page(s) in {}", pages.len(), dir.display());
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn strips_the_suffix() {
        assert_eq!(
            target_path(Path::new("man/ibid.1.md")),
            Some(PathBuf::from("man/ibid.1"))
        );
        assert_eq!(
            target_path(Path::new("example.md")),
            Some(PathBuf::from("example"))
        );
    }

    #[test]
    fn rejects_non_sources() {
        assert_eq!(target_path(Path::new("README")), None);
        assert_eq!(target_path(Path::new("notes.mdx")), None);
        assert_eq!(target_path(Path::new("page.MD")), None);
        assert_eq!(target_path(Path::new(".md")), None);
        assert_eq!(target_path(Path::new("dir/")), None);
    }

    #[test]
    fn discover_filters_and_sorts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.1.md"), "").unwrap();
        fs::write(dir.path().join("a.8.md"), "").unwrap();
        fs::write(dir.path().join("a.8"), "old output").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("sub.md")).unwrap();

        let pages = discover(dir.path()).unwrap();
        let sources: Vec<_> = pages.iter().map(|p| p.source.clone()).collect();
        assert_eq!(
            sources,
            vec![dir.path().join("a.8.md"), dir.path().join("b.1.md")]
        );
        assert_eq!(pages[0].target, dir.path().join("a.8"));
    }

    #[test]
    fn discover_skips_dotfiles() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".draft.md"), "").unwrap();
        fs::write(dir.path().join("real.1.md"), "").unwrap();

        let pages = discover(dir.path()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].target, dir.path().join("real.1"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_still_map() {
        use std::os::unix::ffi::OsStrExt;

        let source = Path::new(OsStr::from_bytes(b"caf\xe9.1.md"));
        assert_eq!(
            target_path(source),
            Some(PathBuf::from(OsStr::from_bytes(b"caf\xe9.1")))
        );
        assert_eq!(target_path(Path::new(OsStr::from_bytes(b"\xff.txt"))), None);
    }

    #[test]
    fn discover_sees_new_files() {
        let dir = tempdir().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
        fs::write(dir.path().join("late.1.md"), "").unwrap();
        assert_eq!(discover(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn discover_missing_dir_is_io_error() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("gone");
        match discover(&gone) {
            Err(Error::Io { path, .. }) => assert_eq!(path, gone),
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn staleness_follows_mtimes() {
        let dir = tempdir().unwrap();
        let page = Page::from_source(dir.path().join("x.1.md")).unwrap();
        fs::write(&page.source, "src").unwrap();
        assert!(page.is_stale().unwrap(), "missing target is stale");

        fs::write(&page.target, "out").unwrap();
        let now = SystemTime::now();
        set_mtime(&page.source, now - Duration::from_secs(60));
        set_mtime(&page.target, now);
        assert!(!page.is_stale().unwrap());

        set_mtime(&page.source, now + Duration::from_secs(60));
        assert!(page.is_stale().unwrap());
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        let f = fs::OpenOptions::new().write(true).open(path).unwrap();
        f.set_modified(when).unwrap();
    }
}
