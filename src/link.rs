// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hardlink deployment.
//!
//! To __deploy__ a path means to recreate it inside a destination directory
//! as hardlinks. Deployment never copies file contents. A deployed file is a
//! second directory entry for the same inode, so the data exists once on
//! disk no matter how many times it gets deployed.
//!
//! # Mirroring
//!
//! Directories themselves cannot be hardlinked on any sane filesystem, so a
//! directory source is __mirrored__ instead: every sub-directory of the
//! source is created fresh at the destination, and only the leaf files are
//! hardlinked. The relative shape of the source tree is preserved exactly,
//! empty directories included.
//!
//! # Conflict Strategies
//!
//! A deployment target name may already be taken. What happens next is
//! decided by a [`ConflictStrategy`](engine::ConflictStrategy) chosen per
//! request: fail the item, skip it as already done, overwrite whatever sits
//! there, or probe for a numbered variant of the name. Conflicts on files
//! are resolved per file, as late as possible, so one collision never drags
//! down the rest of a large recursive deployment. A collision on the
//! top-level directory target is resolved once, eagerly, because silently
//! interleaving new links into an existing foreign directory is unsafe.
//!
//! # Permission Reconciliation
//!
//! Appliance setups often demand that deployed paths carry specific
//! ownership and mode bits, described by an external policy document keyed
//! on path prefixes. Every path this module creates is handed to a
//! [`PermissionLookup`](perms::PermissionLookup) implementation, and any
//! matching rule is applied best-effort. A rule that cannot be applied
//! never invalidates the hardlink that was just created.
//!
//! # See Also
//!
//! 1. [link(2)](https://man7.org/linux/man-pages/man2/link.2.html)
//! 2. [`Linker`](engine::Linker)

pub mod engine;
pub mod perms;
pub mod scan;
