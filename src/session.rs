// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive browsing session.
//!
//! A [`Session`] owns everything the interactive loop knows: the current
//! directory, its sorted listing, the cursor, the set of selected source
//! paths, and whether a text edit is pending. Drivers feed it [`Command`]s
//! one at a time through [`Session::apply`] and render the [`Reaction`]
//! that comes back.
//!
//! # Command Loop Contract
//!
//! Every command produces exactly one reaction. Refusals travel as values
//! rather than errors so the loop keeps running after a command the session
//! cannot honor. While a text edit is pending, only [`Command::Submit`] and
//! [`Command::CancelInput`] reach the session; anything else is refused
//! until the edit resolves.
//!
//! # Selection
//!
//! Selected paths are canonicalized before they enter the set, so the same
//! file reached through different symlinks occupies one slot. Selection
//! survives navigation and clears after deployment.
//!
//! # See Also
//!
//! 1. [`Linker`]

use crate::link::{
    engine::{ConflictStrategy, LinkRequest, Linker},
    perms::{PermissionLookup, PolicyResolver},
    scan::{self, FileEntry},
};

use std::{
    collections::BTreeSet,
    env, fs, io, mem,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// One keystroke's worth of intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Move to the parent directory.
    GoUp,

    /// Move the cursor one entry up.
    MoveUp,

    /// Move the cursor one entry down.
    MoveDown,

    /// Enter the directory under the cursor.
    EnterDir,

    /// Toggle selection of the entry under the cursor.
    ToggleSelect,

    /// Hardlink every selected path into the current directory.
    Deploy,

    /// Delete the entry under the cursor.
    DeleteEntry,

    /// Start renaming the directory under the cursor.
    RenameDir,

    /// Start creating a new directory here.
    NewDir,

    /// Resolve the pending text edit with this input.
    Submit(String),

    /// Abandon the pending text edit.
    CancelInput,
}

/// What a command did to the session.
#[derive(Debug)]
pub enum Reaction {
    /// Command handled, nothing further to report.
    Done,

    /// Command could not be honored.
    Refused(Refusal),

    /// Session needs a line of text before it can continue.
    Prompt(TextPrompt),

    /// Deployment finished with these per-selection counts.
    Deployed { deployed: usize, failed: usize },
}

/// Text the session is waiting for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextPrompt {
    /// New name for a directory, starting from its current name.
    Rename { current: String },

    /// Name for a directory to create.
    NewDirectory,
}

/// Why the session would not honor a command.
#[derive(Debug, thiserror::Error)]
pub enum Refusal {
    /// Deployment asked for with an empty selection.
    #[error("nothing is selected")]
    NothingSelected,

    /// Navigation or mutation asked for while a text edit is pending.
    #[error("finish or cancel the pending text input first")]
    InputPending,

    /// Submitted name collides with an existing entry.
    #[error("{name:?} already exists here")]
    NameTaken { name: String },

    /// Rename asked for on something that is not a directory.
    #[error("only directories can be renamed")]
    NotADirectory,

    /// Directory holds sole-copy data or nested directories.
    #[error("directory keeps data that exists nowhere else")]
    UnsafeDelete,

    /// Filesystem refused the operation outright.
    #[error("{source}")]
    Filesystem { source: io::Error },
}

/// Whether the session is browsing or waiting on text.
#[derive(Debug)]
enum Mode {
    Browsing,
    AwaitingText(PendingEdit),
}

/// The mutation a pending text edit will perform once submitted.
#[derive(Debug)]
enum PendingEdit {
    Rename { from: PathBuf },
    NewDirectory,
}

/// Navigation and selection state for one interactive run.
#[derive(Debug)]
pub struct Session<P = PolicyResolver>
where
    P: PermissionLookup,
{
    linker: Linker<P>,
    current_dir: PathBuf,
    entries: Vec<FileEntry>,
    cursor: usize,
    selected: BTreeSet<PathBuf>,
    mode: Mode,
}

impl<P> Session<P>
where
    P: PermissionLookup,
{
    /// Construct new session at the first usable starting directory.
    ///
    /// An explicit `start` wins outright. Otherwise the first existing
    /// directory among `candidates` is taken, and the process working
    /// directory backstops an empty or stale candidate list.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::StartDir`] if an explicit `start` cannot be
    ///   resolved to an existing directory.
    /// - Return [`SessionError::WorkingDir`] if no candidate matched and
    ///   the working directory cannot be determined.
    pub fn bootstrap(
        start: Option<PathBuf>,
        candidates: &[PathBuf],
        linker: Linker<P>,
    ) -> Result<Self> {
        let current_dir = match start {
            Some(path) => {
                let canonical =
                    fs::canonicalize(&path).map_err(|source| SessionError::StartDir {
                        source,
                        path: path.clone(),
                    })?;
                if !canonical.is_dir() {
                    return Err(SessionError::StartDir {
                        source: io::Error::other("not a directory"),
                        path,
                    });
                }
                canonical
            }
            None => match candidates.iter().find_map(|candidate| {
                fs::canonicalize(candidate)
                    .ok()
                    .filter(|canonical| canonical.is_dir())
            }) {
                Some(canonical) => canonical,
                None => {
                    let cwd = env::current_dir()
                        .map_err(|source| SessionError::WorkingDir { source })?;
                    fs::canonicalize(&cwd)
                        .map_err(|source| SessionError::WorkingDir { source })?
                }
            },
        };

        info!("browsing {}", current_dir.display());
        let mut session = Self {
            linker,
            current_dir,
            entries: Vec::new(),
            cursor: 0,
            selected: BTreeSet::new(),
            mode: Mode::Browsing,
        };
        session.reload();

        Ok(session)
    }

    /// Apply one command and report what happened.
    #[instrument(skip(self), level = "debug")]
    pub fn apply(&mut self, command: Command) -> Reaction {
        if matches!(self.mode, Mode::AwaitingText(_)) {
            return match command {
                Command::Submit(text) => self.submit_text(&text),
                Command::CancelInput => self.cancel_text(),
                _ => Reaction::Refused(Refusal::InputPending),
            };
        }

        match command {
            Command::GoUp => self.go_up(),
            Command::MoveUp => self.move_up(),
            Command::MoveDown => self.move_down(),
            Command::EnterDir => self.enter_dir(),
            Command::ToggleSelect => self.toggle_select(),
            Command::Deploy => self.deploy(),
            Command::DeleteEntry => self.delete_entry(),
            Command::RenameDir => self.request_rename(),
            Command::NewDir => self.request_new_dir(),
            Command::Submit(_) | Command::CancelInput => Reaction::Done,
        }
    }

    /// Directory the session is currently browsing.
    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Sorted listing of the current directory.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Index of the entry under the cursor.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Canonical paths marked for deployment.
    pub fn selection(&self) -> &BTreeSet<PathBuf> {
        &self.selected
    }

    /// Whether this path is part of the selection.
    pub fn is_selected(&self, path: &Path) -> bool {
        fs::canonicalize(path)
            .map(|canonical| self.selected.contains(&canonical))
            .unwrap_or(false)
    }

    /// Whether the session is waiting on a line of text.
    pub fn awaiting_input(&self) -> bool {
        matches!(self.mode, Mode::AwaitingText(_))
    }

    fn go_up(&mut self) -> Reaction {
        let Some(parent) = self.current_dir.parent().map(Path::to_path_buf) else {
            return Reaction::Done;
        };
        self.change_dir(parent)
    }

    fn enter_dir(&mut self) -> Reaction {
        let Some(entry) = self.entries.get(self.cursor) else {
            return Reaction::Done;
        };
        if !entry.is_dir {
            return Reaction::Done;
        }
        self.change_dir(entry.path.clone())
    }

    fn change_dir(&mut self, path: PathBuf) -> Reaction {
        match fs::canonicalize(&path) {
            Ok(canonical) => {
                debug!("entering {}", canonical.display());
                self.current_dir = canonical;
                self.cursor = 0;
                self.reload();
                Reaction::Done
            }
            Err(source) => Reaction::Refused(Refusal::Filesystem { source }),
        }
    }

    fn move_up(&mut self) -> Reaction {
        self.cursor = self.cursor.saturating_sub(1);
        Reaction::Done
    }

    fn move_down(&mut self) -> Reaction {
        if !self.entries.is_empty() {
            self.cursor = (self.cursor + 1).min(self.entries.len() - 1);
        }
        Reaction::Done
    }

    fn toggle_select(&mut self) -> Reaction {
        let Some(entry) = self.entries.get(self.cursor) else {
            return Reaction::Done;
        };
        let key = match fs::canonicalize(&entry.path) {
            Ok(canonical) => canonical,
            Err(source) => return Reaction::Refused(Refusal::Filesystem { source }),
        };
        if !self.selected.remove(&key) {
            debug!("selected {}", key.display());
            self.selected.insert(key);
        }
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }

        Reaction::Done
    }

    fn deploy(&mut self) -> Reaction {
        if self.selected.is_empty() {
            return Reaction::Refused(Refusal::NothingSelected);
        }

        let mut deployed = 0;
        let mut failed = 0;
        for source in self.selected.clone() {
            if fs::symlink_metadata(&source).is_err() {
                warn!("selected path {:?} vanished", source.display());
                failed += 1;
                continue;
            }
            let request = LinkRequest::new(&source, &self.current_dir)
                .with_strategy(ConflictStrategy::Rename);
            match self.linker.deploy(&request) {
                Ok(outcome) if outcome.is_success() => deployed += 1,
                Ok(outcome) => {
                    warn!(
                        "deployment of {:?} failed on {} item(s)",
                        source.display(),
                        outcome.failed
                    );
                    failed += 1;
                }
                Err(error) => {
                    warn!("cannot deploy {:?}: {error}", source.display());
                    failed += 1;
                }
            }
        }

        self.selected.clear();
        self.reload();

        Reaction::Deployed { deployed, failed }
    }

    fn delete_entry(&mut self) -> Reaction {
        let Some(entry) = self.entries.get(self.cursor).cloned() else {
            return Reaction::Done;
        };

        let removal = if entry.is_dir {
            delete_directory(&entry.path)
        } else {
            fs::remove_file(&entry.path).map_err(|source| Refusal::Filesystem { source })
        };

        match removal {
            Ok(()) => {
                info!("deleted {}", entry.path.display());
                self.reload();
                Reaction::Done
            }
            Err(refusal) => Reaction::Refused(refusal),
        }
    }

    fn request_rename(&mut self) -> Reaction {
        let Some(entry) = self.entries.get(self.cursor) else {
            return Reaction::Done;
        };
        if !entry.is_dir {
            return Reaction::Refused(Refusal::NotADirectory);
        }

        let current = entry.name.clone();
        self.mode = Mode::AwaitingText(PendingEdit::Rename {
            from: entry.path.clone(),
        });

        Reaction::Prompt(TextPrompt::Rename { current })
    }

    fn request_new_dir(&mut self) -> Reaction {
        self.mode = Mode::AwaitingText(PendingEdit::NewDirectory);
        Reaction::Prompt(TextPrompt::NewDirectory)
    }

    fn submit_text(&mut self, text: &str) -> Reaction {
        let Mode::AwaitingText(edit) = mem::replace(&mut self.mode, Mode::Browsing) else {
            return Reaction::Done;
        };

        let name = text.trim();
        if name.is_empty() {
            return Reaction::Done;
        }
        let target = self.current_dir.join(name);
        if fs::symlink_metadata(&target).is_ok() {
            return Reaction::Refused(Refusal::NameTaken {
                name: name.to_string(),
            });
        }

        let edited = match edit {
            PendingEdit::Rename { from } => {
                debug!("renaming {:?} to {name:?}", from.display());
                fs::rename(&from, &target)
            }
            PendingEdit::NewDirectory => {
                debug!("creating directory {name:?}");
                fs::create_dir(&target)
            }
        };
        match edited {
            Ok(()) => {
                self.reload();
                Reaction::Done
            }
            Err(source) => Reaction::Refused(Refusal::Filesystem { source }),
        }
    }

    fn cancel_text(&mut self) -> Reaction {
        self.mode = Mode::Browsing;
        Reaction::Done
    }

    fn reload(&mut self) {
        self.entries = scan::list_directory(&self.current_dir);
        // INVARIANT: Cursor stays within the freshly loaded listing.
        self.cursor = self.cursor.min(self.entries.len().saturating_sub(1));
    }
}

/// Delete a directory without destroying sole-copy data.
///
/// An empty directory goes down directly. A directory whose children are
/// all hardlinked regular files is a disposable shell, so the links go
/// first and the directory follows. Anything else is refused, including
/// directories the scan cannot fully account for.
fn delete_directory(path: &Path) -> Result<(), Refusal> {
    let children =
        scan::strict_children(path).map_err(|source| Refusal::Filesystem { source })?;
    if children
        .iter()
        .any(|child| child.is_dir || !child.is_hardlinked())
    {
        return Err(Refusal::UnsafeDelete);
    }

    for child in &children {
        fs::remove_file(&child.path).map_err(|source| Refusal::Filesystem { source })?;
    }
    fs::remove_dir(path).map_err(|source| Refusal::Filesystem { source })
}

/// Session error types.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Requested starting directory cannot be browsed.
    #[error("cannot browse from {:?}", path.display())]
    StartDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Process working directory is unusable as a fallback.
    #[error("cannot determine current working directory")]
    WorkingDir {
        #[source]
        source: io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
