// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the settings file that Oxilink uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Session settings layout.
///
/// Oxilink reads one optional settings file per user. This file is a simple
/// configuration file that details where a browsing session should start,
/// and where the permission policy document can be found.
///
/// # General Layout
///
/// The settings file is composed of two basic parts: settings and policy.
/// The settings section controls the browser itself, mainly through the
/// preference-ordered listing of start directory candidates. The policy
/// section states where the permission policy document lives, either as a
/// direct path or as a locator command whose output names that path.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Settings for the browsing session.
    #[serde(default)]
    pub settings: SessionSettings,

    /// Location of the permission policy document.
    #[serde(default)]
    pub policy: PolicyLocation,
}

impl FromStr for SessionConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: SessionConfig =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on all path fields.
        for start_dir in &mut config.settings.start_dirs {
            *start_dir = expand_path(start_dir)?;
        }
        if let Some(file) = &mut config.policy.file {
            *file = expand_path(file)?;
        }
        if let Some(locator) = &mut config.policy.locator {
            *locator = expand_path(locator)?;
        }

        Ok(config)
    }
}

impl Display for SessionConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Browser session settings.
///
/// Standard settings for any given browsing session.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Preference-ordered start directory candidates.
    ///
    /// The first entry that exists as a directory becomes the initial
    /// browsing directory when no explicit directory was given. The current
    /// working directory is the fallback when none of them exist.
    #[serde(default = "default_start_dirs")]
    pub start_dirs: Vec<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            start_dirs: default_start_dirs(),
        }
    }
}

fn default_start_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/mnt/nas/torrents/complete"),
        PathBuf::from("/mnt/nas/downloads/complete"),
    ]
}

/// Location of the permission policy document.
///
/// Both fields are optional. A direct file path takes precedence over the
/// locator command. The locator is an executable whose standard output
/// names the path of the policy document.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PolicyLocation {
    /// Direct path to the policy document.
    pub file: Option<PathBuf>,

    /// Command that reports the path of the policy document on stdout.
    pub locator: Option<PathBuf>,
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("MEDIA", "/srv/media")])]
    fn deserialize_session_config() -> anyhow::Result<()> {
        let result: SessionConfig = r#"
            [settings]
            start_dirs = ["$MEDIA/incoming", "/var/spool/drops"]

            [policy]
            file = "$MEDIA/permissions.json"
            locator = "/usr/local/sbin/factoryFallback.sh"
        "#
        .parse()?;

        let expect = SessionConfig {
            settings: SessionSettings {
                start_dirs: vec![
                    PathBuf::from("/srv/media/incoming"),
                    PathBuf::from("/var/spool/drops"),
                ],
            },
            policy: PolicyLocation {
                file: Some(PathBuf::from("/srv/media/permissions.json")),
                locator: Some(PathBuf::from("/usr/local/sbin/factoryFallback.sh")),
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_session_config() {
        let result = SessionConfig {
            settings: SessionSettings {
                start_dirs: vec![
                    PathBuf::from("/srv/media/incoming"),
                    PathBuf::from("/var/spool/drops"),
                ],
            },
            policy: PolicyLocation {
                file: Some(PathBuf::from("/srv/media/permissions.json")),
                locator: Some(PathBuf::from("/usr/local/sbin/factoryFallback.sh")),
            },
        }
        .to_string();

        let expect = indoc! {r#"
            [settings]
            start_dirs = [
                "/srv/media/incoming",
                "/var/spool/drops",
            ]

            [policy]
            file = "/srv/media/permissions.json"
            locator = "/usr/local/sbin/factoryFallback.sh"
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn empty_session_config_falls_back_to_defaults() -> anyhow::Result<()> {
        let result: SessionConfig = "".parse()?;

        assert_eq!(result, SessionConfig::default());
        assert_eq!(
            result.settings.start_dirs,
            vec![
                PathBuf::from("/mnt/nas/torrents/complete"),
                PathBuf::from("/mnt/nas/downloads/complete"),
            ]
        );
        assert!(result.policy.file.is_none());
        assert!(result.policy.locator.is_none());

        Ok(())
    }
}
