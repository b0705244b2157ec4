//! Hardlink accounting for the unlinked-download pass.
//!
//! A seeding download is orphaned when none of its files has a hard link
//! outside the client's own tree, i.e. the arr never imported it (or the
//! import was deleted). Links inside `ignored_root_dir` do not count.

use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `(device, inode)`
type FileId = (u64, u64);

#[cfg(unix)]
fn file_id(path: &Path) -> io::Result<(FileId, u64)> {
    use std::os::unix::fs::MetadataExt;
    let md = path.symlink_metadata()?;
    Ok(((md.dev(), md.ino()), md.nlink()))
}

#[cfg(not(unix))]
fn file_id(_path: &Path) -> io::Result<(FileId, u64)> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "hard link counts are only available on unix",
    ))
}

fn files_under(path: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("Failed to read directory entry under '{}': {err}", path.display());
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
}

/// Inode population of the ignored root, computed once per run.
#[derive(Debug, Default)]
pub struct HardlinkIndex {
    root: Option<PathBuf>,
    inodes: HashMap<FileId, u64>,
}

impl HardlinkIndex {
    pub fn build(ignored_root: Option<&Path>) -> Result<Self> {
        let Some(root) = ignored_root else {
            return Ok(Self::default());
        };
        if !root.is_dir() {
            return Err(AppError::Config(format!(
                "Ignored root directory does not exist: {}",
                root.display()
            )));
        }

        let mut inodes: HashMap<FileId, u64> = HashMap::new();
        for path in files_under(root) {
            match file_id(&path) {
                Ok((id, _)) => *inodes.entry(id).or_insert(0) += 1,
                Err(e) if e.kind() == io::ErrorKind::Unsupported => return Err(e.into()),
                Err(e) => tracing::warn!("Failed to stat '{}': {e}", path.display()),
            }
        }
        tracing::debug!("Indexed {} inodes under {}", inodes.len(), root.display());

        Ok(Self {
            root: Some(root.to_path_buf()),
            inodes,
        })
    }

    /// Hard links to `file` other than itself and its copies in the ignored root.
    pub fn external_links(&self, file: &Path) -> Result<u64> {
        let (id, nlink) = file_id(file)?;
        let in_root = self.inodes.get(&id).copied().unwrap_or(0);
        let inside_root = self.root.as_ref().is_some_and(|root| file.starts_with(root));

        let known = if inside_root { in_root.max(1) } else { in_root + 1 };
        Ok(nlink.saturating_sub(known))
    }

    /// Whether no file of the download (a file or a directory) is linked
    /// anywhere else. Missing or empty content is never reported unlinked.
    pub fn is_unlinked(&self, content_path: &Path) -> Result<bool> {
        if !content_path.exists() {
            tracing::debug!("Content path does not exist: {}", content_path.display());
            return Ok(false);
        }

        let mut seen_any = false;
        for file in files_under(content_path) {
            seen_any = true;
            if self.external_links(&file)? > 0 {
                return Ok(false);
            }
        }
        Ok(seen_any)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Layout {
        _dir: TempDir,
        downloads: PathBuf,
        library: PathBuf,
        seeding_root: PathBuf,
    }

    fn layout() -> Layout {
        let dir = TempDir::new().unwrap();
        let downloads = dir.path().join("downloads");
        let library = dir.path().join("library");
        let seeding_root = dir.path().join("cross-seed");
        for path in [&downloads, &library, &seeding_root] {
            fs::create_dir_all(path).unwrap();
        }
        Layout {
            _dir: dir,
            downloads,
            library,
            seeding_root,
        }
    }

    #[test]
    fn test_imported_file_is_linked() {
        let layout = layout();
        let file = layout.downloads.join("movie.mkv");
        fs::write(&file, b"data").unwrap();
        fs::hard_link(&file, layout.library.join("movie.mkv")).unwrap();

        let index = HardlinkIndex::build(None).unwrap();
        assert_eq!(index.external_links(&file).unwrap(), 1);
        assert!(!index.is_unlinked(&file).unwrap());
    }

    #[test]
    fn test_links_in_ignored_root_do_not_count() {
        let layout = layout();
        let content = layout.downloads.join("Show.S01");
        fs::create_dir_all(&content).unwrap();
        let episode = content.join("e01.mkv");
        fs::write(&episode, b"data").unwrap();
        fs::hard_link(&episode, layout.seeding_root.join("e01.mkv")).unwrap();

        let index = HardlinkIndex::build(Some(layout.seeding_root.as_path())).unwrap();
        assert_eq!(index.external_links(&episode).unwrap(), 0);
        assert!(index.is_unlinked(&content).unwrap());

        let without_root = HardlinkIndex::build(None).unwrap();
        assert!(!without_root.is_unlinked(&content).unwrap());
    }

    #[test]
    fn test_one_linked_file_keeps_directory() {
        let layout = layout();
        let content = layout.downloads.join("Album");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("01.flac"), b"a").unwrap();
        fs::write(content.join("02.flac"), b"b").unwrap();
        fs::hard_link(content.join("02.flac"), layout.library.join("02.flac")).unwrap();

        let index = HardlinkIndex::build(Some(layout.seeding_root.as_path())).unwrap();
        assert!(!index.is_unlinked(&content).unwrap());
    }

    #[test]
    fn test_missing_or_empty_content() {
        let layout = layout();
        let index = HardlinkIndex::build(None).unwrap();
        assert!(!index.is_unlinked(&layout.downloads.join("gone")).unwrap());

        let empty = layout.downloads.join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert!(!index.is_unlinked(&empty).unwrap());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let layout = layout();
        let missing = layout.downloads.join("nope");
        assert!(HardlinkIndex::build(Some(missing.as_path())).is_err());
    }
}
