// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::Result;
use std::{
    fs,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};

/// Scratch tree rooted at the test's working directory.
///
/// INVARIANT: Tests run sealed, so the working directory is a fresh
/// temporary directory owned by exactly one test process.
pub(crate) struct TreeFixture {
    root: PathBuf,
}

impl TreeFixture {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            root: std::env::current_dir()?,
        })
    }

    pub(crate) fn dir(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let full = self.root.join(path.as_ref());
        fs::create_dir_all(&full)?;
        Ok(full)
    }

    pub(crate) fn file(
        &self,
        path: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<PathBuf> {
        let full = self.root.join(path.as_ref());
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, contents.as_ref())?;
        Ok(full)
    }

    pub(crate) fn hardlink(
        &self,
        original: impl AsRef<Path>,
        link: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let link = self.root.join(link.as_ref());
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::hard_link(self.root.join(original.as_ref()), &link)?;
        Ok(link)
    }

    pub(crate) fn symlink(
        &self,
        original: impl AsRef<Path>,
        link: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let link = self.root.join(link.as_ref());
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }
        std::os::unix::fs::symlink(self.root.join(original.as_ref()), &link)?;
        Ok(link)
    }

    pub(crate) fn path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path.as_ref())
    }
}

pub(crate) fn inode(path: impl AsRef<Path>) -> Result<u64> {
    Ok(fs::metadata(path.as_ref())?.ino())
}

pub(crate) fn nlink(path: impl AsRef<Path>) -> Result<u64> {
    Ok(fs::metadata(path.as_ref())?.nlink())
}
