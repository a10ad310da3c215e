// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! # Oxilink
//!
//! Interactive file browser built around hardlink deployment. Mark files
//! and directories anywhere on a filesystem, then link them into the
//! directory being browsed without copying a byte. Created paths pick up
//! ownership and mode from a JSON permission policy.
//!
//! The [`session`] module holds the interactive state machine, [`link`]
//! holds the deployment engine beneath it, and [`config`] loads the TOML
//! settings file that seeds both.

pub mod config;
pub mod link;
pub mod path;
pub mod session;

pub use crate::{
    config::SessionConfig,
    link::{
        engine::{ConflictStrategy, LinkError, LinkOutcome, LinkRequest, Linker},
        perms::{PermissionLookup, PermissionRule, PolicyResolver},
        scan::FileEntry,
    },
    session::{Command, Reaction, Refusal, Session, SessionError, TextPrompt},
};
