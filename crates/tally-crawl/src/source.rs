//! Classification of single filesystem entries.

use std::fs::Metadata;
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use tokio::fs;

use crate::inode::InodeKey;

/// What a filesystem entry turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File(FileInfo),
    /// Directory to descend into.
    Directory {
        /// Device the directory lives on.
        device: u64,
    },
    /// Symlink, fifo, socket or device node. Never counted.
    Other,
}

/// Size information of a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Apparent size in bytes.
    pub size: u64,
    /// Set when the file has more than one hardlink.
    pub hardlink: Option<InodeKey>,
}

/// Inspect a directory entry without following symlinks.
pub async fn inspect(path: &Path) -> io::Result<EntryKind> {
    let metadata = fs::symlink_metadata(path).await?;
    Ok(classify(&metadata))
}

/// Inspect a root path given on the command line; symlinks are followed.
pub async fn inspect_root(path: &Path) -> io::Result<EntryKind> {
    let metadata = fs::metadata(path).await?;
    Ok(classify(&metadata))
}

/// Classify already-read metadata.
pub fn classify(metadata: &Metadata) -> EntryKind {
    let file_type = metadata.file_type();
    if file_type.is_file() {
        let hardlink = (get_nlink(metadata) > 1)
            .then(|| InodeKey::new(get_ino(metadata), get_dev(metadata)));
        EntryKind::File(FileInfo {
            size: metadata.len(),
            hardlink,
        })
    } else if file_type.is_dir() {
        EntryKind::Directory {
            device: get_dev(metadata),
        }
    } else {
        EntryKind::Other
    }
}

// Cross-platform metadata helpers

#[cfg(unix)]
fn get_dev(metadata: &Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_ino(metadata: &Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn get_ino(_metadata: &Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_nlink(metadata: &Metadata) -> u64 {
    metadata.nlink()
}

#[cfg(not(unix))]
fn get_nlink(_metadata: &Metadata) -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_regular_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.bin");
        std::fs::write(&path, [0u8; 42]).unwrap();

        match inspect(&path).await.unwrap() {
            EntryKind::File(info) => {
                assert_eq!(info.size, 42);
                assert!(info.hardlink.is_none());
            }
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_directory() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            inspect(temp.path()).await.unwrap(),
            EntryKind::Directory { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_entry_is_error() {
        let temp = TempDir::new().unwrap();
        let err = inspect(&temp.path().join("gone")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(inspect(&link).await.unwrap(), EntryKind::Other);
        assert!(matches!(
            inspect_root(&link).await.unwrap(),
            EntryKind::Directory { .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hardlink_detected() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join("original");
        std::fs::write(&original, b"shared").unwrap();
        std::fs::hard_link(&original, temp.path().join("alias")).unwrap();

        match inspect(&original).await.unwrap() {
            EntryKind::File(info) => assert!(info.hardlink.is_some()),
            other => panic!("expected file, got {other:?}"),
        }
    }
}
