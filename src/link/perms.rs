// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Permission policy resolution.
//!
//! Appliance deployments describe required ownership and mode bits in an
//! external JSON policy document, keyed by path prefix. The document nests
//! storage mounts, then applications, then the actual rule:
//!
//! ```json
//! { "global": { "permissions": {
//!   "nas": { "applications": {
//!     "media": { "paths": ["/mnt/nas/media"],
//!                "user": "media", "group": "media",
//!                "permissions": "0775" }
//! } } } } }
//! ```
//!
//! The resolver flattens that nesting once at load time into plain
//! `(prefix, rule)` pairs, sorted longest prefix first, so that the most
//! specific rule always wins when prefixes overlap. Prefixes match whole
//! path components, never raw characters, so `/mnt/a` cannot claim paths
//! under `/mnt/ab`.
//!
//! # Document Discovery
//!
//! The document path either comes straight from the settings file, or from
//! a __locator__: an executable whose standard output names the document
//! path. Appliances ship such a locator at a well-known location, which is
//! tried last. Discovery failures leave the resolver empty, and an empty
//! resolver simply never reports a rule.
//!
//! # See Also
//!
//! 1. [chown(2)](https://man7.org/linux/man-pages/man2/chown.2.html)
//! 2. [getpwnam(3)](https://man7.org/linux/man-pages/man3/getpwnam.3.html)

use crate::config::PolicyLocation;

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    ffi::CString,
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, instrument, warn};

/// Well-known appliance locator tried when settings name nothing else.
pub const DEFAULT_LOCATOR: &str = "/usr/local/sbin/factoryFallback.sh";

/// Ownership and mode bits demanded for one path prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionRule {
    /// Owning user name.
    pub user: String,

    /// Owning group name.
    pub group: String,

    /// Mode bits, already parsed from the document's octal string.
    pub mode: u32,
}

/// Layer of indirection for permission rule lookup.
pub trait PermissionLookup {
    /// Find the rule governing a destination path, if any.
    fn rule_for(&self, path: &Path) -> Option<PermissionRule>;
}

/// Prefix-matching resolver over a loaded policy document.
///
/// Construct once per session and hand to the deployment engine. The
/// flattened rule table is read-only after load.
#[derive(Clone, Debug, Default)]
pub struct PolicyResolver {
    rules: Vec<(PathBuf, PermissionRule)>,
}

impl PolicyResolver {
    /// Construct a resolver that never reports a rule.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and flatten a policy document.
    ///
    /// # Errors
    ///
    /// - Return [`PolicyError::Read`] if the document cannot be read.
    /// - Return [`PolicyError::Parse`] if the document is not valid JSON.
    /// - Return [`PolicyError::BadMode`] if a rule carries a non-octal mode.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| PolicyError::Read {
            source,
            path: path.to_path_buf(),
        })?;
        let document: PolicyDocument =
            serde_json::from_str(&data).map_err(PolicyError::Parse)?;
        let resolver = Self::from_document(document)?;
        info!(
            "loaded {} permission rule(s) from {:?}",
            resolver.rules.len(),
            path.display()
        );

        Ok(resolver)
    }

    /// Run a locator command and load the policy document it names.
    ///
    /// # Errors
    ///
    /// - Return [`PolicyError::Locator`] if the locator cannot be run, exits
    ///   non-zero, or reports nothing.
    /// - Return any [`Self::from_file`] error for the named document.
    #[instrument(skip(command), level = "debug")]
    pub fn from_locator(command: impl AsRef<Path>) -> Result<Self> {
        let command = command.as_ref();
        let output = Command::new(command)
            .output()
            .map_err(|source| PolicyError::Locator {
                source,
                command: command.to_path_buf(),
            })?;
        if !output.status.success() {
            return Err(PolicyError::Locator {
                source: std::io::Error::other(format!("locator exited with {}", output.status)),
                command: command.to_path_buf(),
            });
        }

        let reported = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if reported.is_empty() {
            return Err(PolicyError::Locator {
                source: std::io::Error::other("locator reported no document path"),
                command: command.to_path_buf(),
            });
        }
        debug!("locator reported policy document {reported:?}");

        Self::from_file(reported)
    }

    /// Resolve a policy location from settings, best-effort.
    ///
    /// Tries the direct file first, then the configured locator, then the
    /// well-known appliance locator. Any failure logs a warning and leaves
    /// the resolver empty rather than blocking the browser.
    pub fn discover(location: &PolicyLocation) -> Self {
        let attempt = if let Some(file) = &location.file {
            Self::from_file(file)
        } else if let Some(locator) = &location.locator {
            Self::from_locator(locator)
        } else if Path::new(DEFAULT_LOCATOR).exists() {
            Self::from_locator(DEFAULT_LOCATOR)
        } else {
            debug!("no policy document configured, permissions stay untouched");
            return Self::empty();
        };

        match attempt {
            Ok(resolver) => resolver,
            Err(error) => {
                warn!("no permission policy available: {error}");
                Self::empty()
            }
        }
    }

    fn from_document(document: PolicyDocument) -> Result<Self> {
        let mut rules = Vec::new();
        for mount in document.global.permissions.into_values() {
            for (application, entry) in mount.applications {
                let mode = u32::from_str_radix(&entry.permissions, 8).map_err(|_| {
                    PolicyError::BadMode {
                        mode: entry.permissions.clone(),
                        application: application.clone(),
                    }
                })?;
                for prefix in entry.paths {
                    rules.push((
                        prefix,
                        PermissionRule {
                            user: entry.user.clone(),
                            group: entry.group.clone(),
                            mode,
                        },
                    ));
                }
            }
        }

        // INVARIANT: Longest prefix sorts first, so the most specific rule
        // wins when prefixes overlap.
        rules.sort_by(|(a, _), (b, _)| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| a.cmp(b))
        });

        Ok(Self { rules })
    }
}

impl PermissionLookup for PolicyResolver {
    fn rule_for(&self, path: &Path) -> Option<PermissionRule> {
        self.rules
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix))
            .map(|(_, rule)| rule.clone())
    }
}

/// Apply ownership and mode bits to a freshly created path.
///
/// # Errors
///
/// - Return [`ApplyError::UnknownUser`]/[`ApplyError::UnknownGroup`] if the
///   rule names an account this system does not know.
/// - Return [`ApplyError::Chown`]/[`ApplyError::Chmod`] if the filesystem
///   refuses the change.
pub fn apply_rule(path: &Path, rule: &PermissionRule) -> Result<(), ApplyError> {
    let uid = lookup_uid(&rule.user)?;
    let gid = lookup_gid(&rule.group)?;

    debug!(
        "apply {}:{} mode {:03o} to {:?}",
        rule.user,
        rule.group,
        rule.mode,
        path.display()
    );
    std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|source| ApplyError::Chown {
        source,
        path: path.to_path_buf(),
    })?;
    fs::set_permissions(path, fs::Permissions::from_mode(rule.mode)).map_err(|source| {
        ApplyError::Chmod {
            source,
            path: path.to_path_buf(),
        }
    })?;

    Ok(())
}

fn lookup_uid(user: &str) -> Result<u32, ApplyError> {
    let unknown = || ApplyError::UnknownUser {
        user: user.to_string(),
    };
    let name = CString::new(user).map_err(|_| unknown())?;
    let mut passwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::passwd = std::ptr::null_mut();
    let mut buffer = vec![0_u8; 1024];

    loop {
        let status = unsafe {
            libc::getpwnam_r(
                name.as_ptr(),
                &mut passwd,
                buffer.as_mut_ptr().cast(),
                buffer.len(),
                &mut found,
            )
        };
        if status == libc::ERANGE && buffer.len() < 1 << 16 {
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }
        if status != 0 || found.is_null() {
            return Err(unknown());
        }

        return Ok(passwd.pw_uid);
    }
}

fn lookup_gid(group: &str) -> Result<u32, ApplyError> {
    let unknown = || ApplyError::UnknownGroup {
        group: group.to_string(),
    };
    let name = CString::new(group).map_err(|_| unknown())?;
    let mut entry: libc::group = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::group = std::ptr::null_mut();
    let mut buffer = vec![0_u8; 1024];

    loop {
        let status = unsafe {
            libc::getgrnam_r(
                name.as_ptr(),
                &mut entry,
                buffer.as_mut_ptr().cast(),
                buffer.len(),
                &mut found,
            )
        };
        if status == libc::ERANGE && buffer.len() < 1 << 16 {
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }
        if status != 0 || found.is_null() {
            return Err(unknown());
        }

        return Ok(entry.gr_gid);
    }
}

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    global: GlobalSection,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalSection {
    #[serde(default)]
    permissions: BTreeMap<String, MountSection>,
}

#[derive(Debug, Deserialize)]
struct MountSection {
    #[serde(default)]
    applications: BTreeMap<String, ApplicationEntry>,
}

#[derive(Debug, Deserialize)]
struct ApplicationEntry {
    #[serde(default)]
    paths: Vec<PathBuf>,
    user: String,
    group: String,
    permissions: String,
}

/// Policy document loading error types.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Policy document cannot be read.
    #[error("cannot read policy document {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Policy document is not valid JSON.
    #[error(transparent)]
    Parse(#[from] serde_json::Error),

    /// Locator command failed to report a document path.
    #[error("policy locator {:?} failed", command.display())]
    Locator {
        #[source]
        source: std::io::Error,
        command: PathBuf,
    },

    /// Rule carries a mode string that is not octal.
    #[error("application {application:?} declares invalid octal mode {mode:?}")]
    BadMode { mode: String, application: String },
}

/// Permission application error types. Never fatal to a deployment.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Rule names an unknown user account.
    #[error("no such user {user:?}")]
    UnknownUser { user: String },

    /// Rule names an unknown group.
    #[error("no such group {group:?}")]
    UnknownGroup { group: String },

    /// Ownership change refused.
    #[error("cannot change ownership of {:?}", path.display())]
    Chown {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Mode change refused.
    #[error("cannot change mode of {:?}", path.display())]
    Chmod {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = PolicyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn resolver(document: &str) -> PolicyResolver {
        let document: PolicyDocument =
            serde_json::from_str(document).unwrap_or_else(|error| panic!("bad fixture: {error}"));
        PolicyResolver::from_document(document)
            .unwrap_or_else(|error| panic!("bad fixture: {error}"))
    }

    #[test]
    fn nested_document_flattens_into_rules() {
        let resolver = resolver(indoc! {r#"
            { "global": { "permissions": {
              "nas": { "applications": {
                "media": { "paths": ["/mnt/nas/media", "/mnt/nas/staging"],
                           "user": "media", "group": "media",
                           "permissions": "0775" }
            } } } } }
        "#});

        let rule = resolver.rule_for(Path::new("/mnt/nas/media/show/episode.mkv"));

        assert_eq!(
            rule,
            Some(PermissionRule {
                user: "media".into(),
                group: "media".into(),
                mode: 0o775,
            })
        );
        assert!(resolver
            .rule_for(Path::new("/mnt/nas/staging/incoming.iso"))
            .is_some());
        assert!(resolver.rule_for(Path::new("/mnt/elsewhere")).is_none());
    }

    #[test]
    fn longest_prefix_wins_for_overlapping_rules() {
        let resolver = resolver(indoc! {r#"
            { "global": { "permissions": {
              "nas": { "applications": {
                "catchall": { "paths": ["/mnt/nas"],
                              "user": "admin", "group": "admin",
                              "permissions": "0755" },
                "media": { "paths": ["/mnt/nas/media"],
                           "user": "media", "group": "media",
                           "permissions": "0775" }
            } } } } }
        "#});

        let specific = resolver.rule_for(Path::new("/mnt/nas/media/film.mkv"));
        let general = resolver.rule_for(Path::new("/mnt/nas/other.txt"));

        assert_eq!(specific.map(|rule| rule.user), Some("media".to_string()));
        assert_eq!(general.map(|rule| rule.user), Some("admin".to_string()));
    }

    #[test]
    fn prefixes_match_whole_components_only() {
        let resolver = resolver(indoc! {r#"
            { "global": { "permissions": {
              "nas": { "applications": {
                "app": { "paths": ["/mnt/a"],
                         "user": "app", "group": "app",
                         "permissions": "0700" }
            } } } } }
        "#});

        assert!(resolver.rule_for(Path::new("/mnt/a/file")).is_some());
        assert!(resolver.rule_for(Path::new("/mnt/ab/file")).is_none());
    }

    #[test]
    fn invalid_octal_mode_fails_the_load() {
        let document: PolicyDocument = serde_json::from_str(indoc! {r#"
            { "global": { "permissions": {
              "nas": { "applications": {
                "app": { "paths": ["/mnt/a"],
                         "user": "app", "group": "app",
                         "permissions": "rwxr-xr-x" }
            } } } } }
        "#})
        .unwrap_or_else(|error| panic!("bad fixture: {error}"));

        let result = PolicyResolver::from_document(document);

        assert!(matches!(result, Err(PolicyError::BadMode { .. })));
    }

    #[test]
    fn empty_document_reports_no_rules() {
        let resolver = resolver("{}");

        assert!(resolver.rule_for(Path::new("/anything")).is_none());
    }
}
