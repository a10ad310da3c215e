// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hardlink deployment engine.
//!
//! The [`Linker`] turns one [`LinkRequest`] into hardlinks at the requested
//! destination. A file source becomes a single link. A directory source is
//! mirrored: sub-directories are created fresh, leaf files are linked, and
//! the relative shape of the tree is preserved exactly.
//!
//! Conflicts on file names are resolved per file, as late as possible, so
//! one collision never drags down the rest of a recursive deployment. The
//! outcome accumulates per-file counts instead of aborting, and the caller
//! decides what to do with a partial result. Only the preconditions and the
//! top-level target conflict abort a whole request.
//!
//! Every created path is offered to the engine's [`PermissionLookup`] for
//! ownership and mode reconciliation. Rules apply best-effort: a rule that
//! cannot be applied is logged and counted, never fatal.

use crate::link::{
    perms::{self, PermissionLookup, PolicyResolver},
    scan::scan_tree,
};

use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Policy applied when a deployment target name is already taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Refuse the item and report a conflict.
    #[default]
    Fail,

    /// Report the item as done without touching anything.
    Skip,

    /// Remove whatever occupies the target name, then link.
    Overwrite,

    /// Probe numbered variants of the name until a free one turns up.
    ///
    /// File-level only. A top-level directory target degrades to [`Fail`],
    /// because renaming the root would break every mirrored relative path
    /// beneath it.
    ///
    /// [`Fail`]: ConflictStrategy::Fail
    Rename,
}

/// One deployment request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRequest {
    /// Path to deploy from.
    pub source: PathBuf,

    /// Existing directory to deploy into.
    pub destination: PathBuf,

    /// Target name, defaulting to the source's base name.
    pub name: Option<String>,

    /// Conflict policy for this request.
    pub strategy: ConflictStrategy,
}

impl LinkRequest {
    /// Construct new request with default name and strategy.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            name: None,
            strategy: ConflictStrategy::default(),
        }
    }

    /// Deploy under an explicit name instead of the source's base name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Select the conflict policy for this request.
    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Accumulated result of one deployment request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Hardlinks created.
    pub linked: usize,

    /// Items left alone under the skip policy.
    pub skipped: usize,

    /// Items that could not be deployed.
    pub failed: usize,

    /// Permission rules that could not be applied to created paths.
    ///
    /// Never counts against [`is_success`](Self::is_success).
    pub perm_failures: usize,
}

impl LinkOutcome {
    /// Whether every item of the request was deployed or skipped.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Where a resolved file conflict left the target.
enum Placement {
    /// Link at this now-free path.
    Link(PathBuf),

    /// Leave the existing occupant alone and report success.
    Skip,
}

/// The hardlink deployment engine.
///
/// Generic over its permission seam so tests can inject canned rules, with
/// the document-backed [`PolicyResolver`] as the everyday default.
#[derive(Debug)]
pub struct Linker<P = PolicyResolver>
where
    P: PermissionLookup,
{
    policy: P,
}

impl<P> Linker<P>
where
    P: PermissionLookup,
{
    /// Construct new linker around a permission seam.
    pub fn new(policy: P) -> Self {
        Self { policy }
    }

    /// Deploy one request.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::SourceNotFound`] if the source does not exist.
    /// - Return [`LinkError::InvalidDestination`] if the destination is not
    ///   an existing directory.
    /// - Return [`LinkError::Conflict`] if the top-level target exists and
    ///   the strategy refuses to touch it.
    /// - Return [`LinkError::Overwrite`] if clearing an occupant fails.
    /// - Return [`LinkError::NameExhausted`] if 999 numbered probes found no
    ///   free name for a file source.
    /// - Return [`LinkError::CrossDevice`] if source and destination sit on
    ///   different filesystems.
    /// - Return [`LinkError::Io`] for any other filesystem refusal.
    ///
    /// Inside a directory mirror, the same conditions are demoted to
    /// per-file failure counts on the outcome instead of errors.
    #[instrument(skip(self, request), level = "debug")]
    pub fn deploy(&self, request: &LinkRequest) -> Result<LinkOutcome> {
        let source = request.source.as_path();
        if fs::symlink_metadata(source).is_err() {
            return Err(LinkError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }
        let destination = request.destination.as_path();
        if !destination.is_dir() {
            return Err(LinkError::InvalidDestination {
                path: destination.to_path_buf(),
            });
        }

        let name = match &request.name {
            Some(name) => name.clone(),
            None => source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| LinkError::Io {
                    source: std::io::Error::other("source path has no base name"),
                    path: source.to_path_buf(),
                })?,
        };

        let metadata = fs::metadata(source).map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => LinkError::SourceNotFound {
                path: source.to_path_buf(),
            },
            _ => LinkError::Io {
                source: error,
                path: source.to_path_buf(),
            },
        })?;

        info!(
            "deploy {:?} into {:?} as {name:?}",
            source.display(),
            destination.display()
        );
        let outcome = if metadata.is_dir() {
            self.deploy_tree(source, destination, &name, request.strategy)?
        } else {
            self.deploy_file(source, destination, &name, request.strategy)?
        };
        info!(
            "linked {}, skipped {}, failed {}",
            outcome.linked, outcome.skipped, outcome.failed
        );

        Ok(outcome)
    }

    fn deploy_file(
        &self,
        source: &Path,
        directory: &Path,
        name: &str,
        strategy: ConflictStrategy,
    ) -> Result<LinkOutcome> {
        let mut outcome = LinkOutcome::default();
        match self.place_file(directory, name, strategy)? {
            Placement::Skip => {
                debug!("{name:?} already present, leaving it alone");
                outcome.skipped += 1;
            }
            Placement::Link(target) => {
                link_file(source, &target)?;
                outcome.linked += 1;
                self.reconcile(&target, &mut outcome);
            }
        }

        Ok(outcome)
    }

    fn deploy_tree(
        &self,
        source: &Path,
        directory: &Path,
        name: &str,
        strategy: ConflictStrategy,
    ) -> Result<LinkOutcome> {
        let target = directory.join(name);
        let mut outcome = LinkOutcome::default();

        if fs::symlink_metadata(&target).is_ok() {
            let strategy = match strategy {
                ConflictStrategy::Rename => {
                    warn!(
                        "rename cannot disambiguate directory target {:?}, refusing",
                        target.display()
                    );
                    ConflictStrategy::Fail
                }
                other => other,
            };
            match strategy {
                ConflictStrategy::Fail | ConflictStrategy::Rename => {
                    return Err(LinkError::Conflict { path: target });
                }
                ConflictStrategy::Skip => {
                    debug!("{:?} already present, leaving it alone", target.display());
                    outcome.skipped += 1;
                    return Ok(outcome);
                }
                ConflictStrategy::Overwrite => remove_occupant(&target)?,
            }
        }

        fs::create_dir_all(&target).map_err(|source| LinkError::Io {
            source,
            path: target.clone(),
        })?;
        self.reconcile(&target, &mut outcome);

        let scan = scan_tree(source);
        outcome.failed += scan.skipped;

        // Relative prefixes whose mirror directory could not be created.
        // Everything beneath them is unreachable at the destination.
        let mut dead_prefixes: Vec<PathBuf> = Vec::new();
        for entry in &scan.entries {
            // INVARIANT: The walker only yields paths beneath the scanned
            // root.
            let rel = match entry.path.strip_prefix(source) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            if dead_prefixes.iter().any(|prefix| rel.starts_with(prefix)) {
                continue;
            }
            let mirrored = target.join(rel);

            if entry.is_dir {
                if let Err(error) = fs::create_dir_all(&mirrored) {
                    warn!("cannot mirror directory {:?}: {error}", mirrored.display());
                    outcome.failed += 1;
                    dead_prefixes.push(rel.to_path_buf());
                    continue;
                }
                self.reconcile(&mirrored, &mut outcome);
            } else {
                let Some(parent) = mirrored.parent() else {
                    continue;
                };
                match self.place_file(parent, &entry.name, strategy) {
                    Ok(Placement::Skip) => outcome.skipped += 1,
                    Ok(Placement::Link(link_path)) => match link_file(&entry.path, &link_path) {
                        Ok(()) => {
                            outcome.linked += 1;
                            self.reconcile(&link_path, &mut outcome);
                        }
                        Err(error) => {
                            warn!("cannot link {:?}: {error}", entry.path.display());
                            outcome.failed += 1;
                        }
                    },
                    Err(error) => {
                        warn!("cannot place {:?}: {error}", entry.path.display());
                        outcome.failed += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Resolve a file-level name conflict inside a directory.
    fn place_file(
        &self,
        directory: &Path,
        name: &str,
        strategy: ConflictStrategy,
    ) -> Result<Placement> {
        let candidate = directory.join(name);
        // INVARIANT: Probe with symlink_metadata so dangling symlinks still
        // count as occupants.
        if fs::symlink_metadata(&candidate).is_err() {
            return Ok(Placement::Link(candidate));
        }

        match strategy {
            ConflictStrategy::Fail => Err(LinkError::Conflict { path: candidate }),
            ConflictStrategy::Skip => Ok(Placement::Skip),
            ConflictStrategy::Overwrite => {
                remove_occupant(&candidate)?;
                Ok(Placement::Link(candidate))
            }
            ConflictStrategy::Rename => next_free_name(directory, name).map(Placement::Link),
        }
    }

    fn reconcile(&self, path: &Path, outcome: &mut LinkOutcome) {
        let Some(rule) = self.policy.rule_for(path) else {
            return;
        };
        if let Err(error) = perms::apply_rule(path, &rule) {
            warn!(
                "cannot apply permission rule to {:?}: {error}",
                path.display()
            );
            outcome.perm_failures += 1;
        }
    }
}

fn link_file(source: &Path, target: &Path) -> Result<()> {
    fs::hard_link(source, target).map_err(|error| {
        if error.raw_os_error() == Some(libc::EXDEV) {
            LinkError::CrossDevice {
                source: error,
                from: source.to_path_buf(),
                to: target.to_path_buf(),
            }
        } else {
            LinkError::Io {
                source: error,
                path: target.to_path_buf(),
            }
        }
    })
}

/// Clear an occupied target path for overwriting.
///
/// A directory occupant goes down recursively, unless it is merely a
/// symlink to a directory, which unlinks like a file.
fn remove_occupant(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|source| LinkError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let removal = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    removal.map_err(|source| LinkError::Overwrite {
        source,
        path: path.to_path_buf(),
    })
}

/// Probe numbered variants of a taken name until one is free.
fn next_free_name(directory: &Path, name: &str) -> Result<PathBuf> {
    for counter in 1..=999 {
        let candidate = directory.join(numbered_name(name, counter));
        if fs::symlink_metadata(&candidate).is_err() {
            debug!("settled name dispute with {:?}", candidate.display());
            return Ok(candidate);
        }
    }

    Err(LinkError::NameExhausted {
        name: name.to_string(),
        directory: directory.to_path_buf(),
    })
}

/// Splice a counter between a file name's stem and its extension.
fn numbered_name(name: &str, counter: u32) -> String {
    let base = Path::new(name);
    let stem = base
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(name);
    let suffix = base
        .extension()
        .and_then(OsStr::to_str)
        .map(|extension| format!(".{extension}"))
        .unwrap_or_default();

    format!("{stem} ({counter}){suffix}")
}

/// Deployment error types.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Source path does not exist.
    #[error("source {:?} does not exist", path.display())]
    SourceNotFound { path: PathBuf },

    /// Destination is missing or not a directory.
    #[error("destination {:?} is not an existing directory", path.display())]
    InvalidDestination { path: PathBuf },

    /// Target name is taken and the strategy refuses to touch it.
    #[error("{:?} already exists", path.display())]
    Conflict { path: PathBuf },

    /// Existing occupant could not be cleared for overwriting.
    #[error("cannot clear {:?} for overwrite", path.display())]
    Overwrite {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// All 999 numbered name probes came up taken.
    #[error("no free numbered variant of {name:?} left in {:?}", directory.display())]
    NameExhausted { name: String, directory: PathBuf },

    /// Source and destination sit on different filesystems.
    #[error("hardlink from {:?} to {:?} cannot cross filesystems", from.display(), to.display())]
    CrossDevice {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Any other filesystem refusal.
    #[error("filesystem refused operation on {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("report.txt", 1, "report (1).txt"; "plain extension")]
    #[test_case("report.txt", 42, "report (42).txt"; "multi digit counter")]
    #[test_case("archive.tar.gz", 2, "archive.tar (2).gz"; "compound extension splits at last dot")]
    #[test_case("Makefile", 1, "Makefile (1)"; "no extension")]
    #[test_case(".bashrc", 3, ".bashrc (3)"; "leading dot name has no extension")]
    #[test]
    fn numbered_name_splices_counter(name: &str, counter: u32, expect: &str) {
        // INVARIANT: Explicit import disambiguates the glob re-import inside
        // the module that test_case generates around this function.
        use pretty_assertions::assert_eq;

        assert_eq!(numbered_name(name, counter), expect);
    }

    #[test]
    fn outcome_success_ignores_permission_failures() {
        let outcome = LinkOutcome {
            linked: 3,
            skipped: 1,
            failed: 0,
            perm_failures: 2,
        };

        assert!(outcome.is_success());
    }

    #[test]
    fn default_strategy_refuses_conflicts() {
        assert_eq!(ConflictStrategy::default(), ConflictStrategy::Fail);
    }
}
