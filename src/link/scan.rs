// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory scanning and hardlink classification.
//!
//! Interactive listings are best-effort: an entry that cannot be stat'ed is
//! dropped from the result instead of failing the whole listing. Deletion
//! safety checks use the strict variant, where any unreadable entry refuses
//! the operation, because a skipped entry could hide sole-owned data.

use ignore::WalkBuilder;
use std::{fs, os::unix::fs::MetadataExt, path::Path, path::PathBuf};
use tracing::debug;

/// Snapshot of one directory entry.
///
/// Recomputed on every listing, never persisted. Stat information follows
/// symlinks, so a symlink to a directory lists as a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path of the entry.
    pub path: PathBuf,

    /// Base name of the entry.
    pub name: String,

    /// Whether the entry is a directory.
    pub is_dir: bool,

    /// Number of directory entries sharing the inode.
    pub nlink: u64,
}

impl FileEntry {
    /// Stat a path into an entry.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => path.to_string_lossy().into_owned(),
        };

        Ok(Self {
            name,
            path: path.to_path_buf(),
            is_dir: metadata.is_dir(),
            nlink: metadata.nlink(),
        })
    }

    /// Whether the entry shares its inode with another directory entry.
    ///
    /// Directory link counts reflect internal bookkeeping, never meaningful
    /// hardlink sharing, so directories are never reported as hardlinked.
    pub fn is_hardlinked(&self) -> bool {
        self.nlink > 1 && !self.is_dir
    }
}

/// List one directory level for interactive browsing.
///
/// Directories sort first, then everything by case-insensitive name. Every
/// per-entry failure is swallowed with a debug log, and an unreadable
/// directory simply lists as empty.
pub fn list_directory(path: &Path) -> Vec<FileEntry> {
    let mut entries = Vec::new();
    let reader = match fs::read_dir(path) {
        Ok(reader) => reader,
        Err(error) => {
            debug!("cannot list {:?}: {error}", path.display());
            return entries;
        }
    };

    for dirent in reader {
        let dirent = match dirent {
            Ok(dirent) => dirent,
            Err(error) => {
                debug!("cannot read entry under {:?}: {error}", path.display());
                continue;
            }
        };
        match FileEntry::from_path(&dirent.path()) {
            Ok(entry) => entries.push(entry),
            Err(error) => debug!("skipping {:?}: {error}", dirent.path().display()),
        }
    }

    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    entries
}

/// List one directory level, propagating every failure.
pub fn strict_children(path: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut children = Vec::new();
    for dirent in fs::read_dir(path)? {
        children.push(FileEntry::from_path(&dirent?.path())?);
    }

    Ok(children)
}

/// Inventory of a recursive tree walk.
#[derive(Clone, Debug, Default)]
pub struct TreeScan {
    /// Every reachable entry beneath the root, parents before children.
    pub entries: Vec<FileEntry>,

    /// Count of entries dropped because they could not be read.
    pub skipped: usize,
}

/// Walk a directory tree recursively.
///
/// The root itself is excluded. Hidden files are included, symlinks are not
/// followed, and unreadable entries are counted into
/// [`skipped`](TreeScan::skipped) rather than aborting the walk.
pub fn scan_tree(root: &Path) -> TreeScan {
    let mut scan = TreeScan::default();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for step in walker {
        let entry = match step {
            Ok(entry) => entry,
            Err(error) => {
                debug!("walk error under {:?}: {error}", root.display());
                scan.skipped += 1;
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(error) => {
                debug!("cannot stat {:?}: {error}", entry.path().display());
                scan.skipped += 1;
                continue;
            }
        };

        scan.entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_path_buf(),
            is_dir: metadata.is_dir(),
            nlink: metadata.nlink(),
        });
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn listing_sorts_directories_first_then_names() -> anyhow::Result<()> {
        fs::create_dir("zebra")?;
        fs::create_dir("Apple")?;
        fs::write("banana.txt", "b")?;
        fs::write("Cherry.txt", "c")?;

        let names: Vec<String> = list_directory(Path::new("."))
            .into_iter()
            .map(|entry| entry.name)
            .collect();

        assert_eq!(names, vec!["Apple", "zebra", "banana.txt", "Cherry.txt"]);

        Ok(())
    }

    #[sealed_test]
    fn hardlinked_files_are_classified_by_link_count() -> anyhow::Result<()> {
        fs::write("single.txt", "alone")?;
        fs::write("shared.txt", "together")?;
        fs::hard_link("shared.txt", "twin.txt")?;
        fs::create_dir("nested")?;

        let single = FileEntry::from_path(Path::new("single.txt"))?;
        let shared = FileEntry::from_path(Path::new("shared.txt"))?;
        let nested = FileEntry::from_path(Path::new("nested"))?;

        assert!(!single.is_hardlinked());
        assert!(shared.is_hardlinked());
        assert_eq!(shared.nlink, 2);
        assert!(!nested.is_hardlinked());

        Ok(())
    }

    #[sealed_test]
    fn unreadable_directory_lists_as_empty() {
        let entries = list_directory(Path::new("does-not-exist"));

        assert!(entries.is_empty());
    }

    #[sealed_test]
    fn tree_scan_inventories_whole_tree_parents_first() -> anyhow::Result<()> {
        fs::create_dir_all("tree/sub/deep")?;
        fs::write("tree/top.txt", "t")?;
        fs::write("tree/sub/mid.txt", "m")?;
        fs::write("tree/sub/deep/leaf.txt", "l")?;
        fs::create_dir("tree/hollow")?;

        let scan = scan_tree(Path::new("tree"));

        assert_eq!(scan.skipped, 0);
        assert_eq!(scan.entries.len(), 6);

        let position = |name: &str| {
            scan.entries
                .iter()
                .position(|entry| entry.name == name)
                .ok_or_else(|| anyhow::anyhow!("{name} missing from scan"))
        };
        assert!(position("sub")? < position("mid.txt")?);
        assert!(position("deep")? < position("leaf.txt")?);
        assert!(scan.entries.iter().any(|entry| entry.name == "hollow" && entry.is_dir));

        Ok(())
    }
}
