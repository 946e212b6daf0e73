//! Decides whether the rich activity surface can be used on the current device.
//! [CapabilityProbe] is the main artifact of this module. It is a pure function of the platform
//! identity and never fails: anything it can't recognize is treated as unsupported, so the
//! universally available notification path gets picked instead.

use std::{fmt::Display, str::FromStr};

use serde::Serialize;
use tracing::debug;

use crate::config::DEFAULT_ACTIVITY_MIN_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Ios,
    Android,
    Web,
    Desktop,
    Unknown,
}

impl Display for PlatformFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformFamily::Ios => write!(f, "ios"),
            PlatformFamily::Android => write!(f, "android"),
            PlatformFamily::Web => write!(f, "web"),
            PlatformFamily::Desktop => write!(f, "desktop"),
            PlatformFamily::Unknown => write!(f, "unknown"),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "ios")] {
        const COMPILED_FAMILY: PlatformFamily = PlatformFamily::Ios;
    } else if #[cfg(target_os = "android")] {
        const COMPILED_FAMILY: PlatformFamily = PlatformFamily::Android;
    } else if #[cfg(target_family = "wasm")] {
        const COMPILED_FAMILY: PlatformFamily = PlatformFamily::Web;
    } else if #[cfg(any(target_os = "linux", target_os = "windows", target_os = "macos"))] {
        const COMPILED_FAMILY: PlatformFamily = PlatformFamily::Desktop;
    } else {
        const COMPILED_FAMILY: PlatformFamily = PlatformFamily::Unknown;
    }
}

/// Which platform the process runs on and which OS version it reports. The version is kept as
/// the raw string because platforms report it in different shapes, e.g. '17.4.1' or '14'.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformIdentity {
    pub family: PlatformFamily,
    pub version: Option<String>,
}

impl PlatformIdentity {
    pub fn new(family: PlatformFamily, version: impl Into<String>) -> Self {
        Self {
            family,
            version: Some(version.into()),
        }
    }

    /// Resolves the identity of the running process.
    pub fn current() -> Self {
        Self {
            family: COMPILED_FAMILY,
            version: sysinfo::System::os_version(),
        }
    }
}

/// Major and minor part of an OS version. Patch components and anything after them are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
}

impl FromStr for OsVersion {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts.next().unwrap_or_default().parse()?;
        let minor = match parts.next() {
            Some(minor) => minor.parse()?,
            None => 0,
        };
        Ok(OsVersion { major, minor })
    }
}

pub struct CapabilityProbe {
    platform: PlatformIdentity,
    minimum: Option<OsVersion>,
}

impl CapabilityProbe {
    /// `minimum_version` is the lowest iOS version with the activity surface. An unparsable
    /// minimum disables the surface completely.
    pub fn new(platform: PlatformIdentity, minimum_version: &str) -> Self {
        Self {
            platform,
            minimum: minimum_version.parse().ok(),
        }
    }

    pub fn for_current_platform(minimum_version: &str) -> Self {
        Self::new(PlatformIdentity::current(), minimum_version)
    }

    pub fn platform(&self) -> &PlatformIdentity {
        &self.platform
    }

    pub fn supports_rich_activity(&self) -> bool {
        if self.platform.family != PlatformFamily::Ios {
            return false;
        }
        let (Some(minimum), Some(version)) = (self.minimum, self.platform.version.as_deref())
        else {
            return false;
        };
        match version.parse::<OsVersion>() {
            Ok(version) => version >= minimum,
            Err(e) => {
                debug!("Couldn't parse platform version {version:?}: {e}");
                false
            }
        }
    }
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        Self::for_current_platform(DEFAULT_ACTIVITY_MIN_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(family: PlatformFamily, version: &str) -> CapabilityProbe {
        CapabilityProbe::new(PlatformIdentity::new(family, version), "16.1")
    }

    #[test]
    fn ios_version_gate() {
        assert!(probe(PlatformFamily::Ios, "16.1").supports_rich_activity());
        assert!(probe(PlatformFamily::Ios, "17.4.1").supports_rich_activity());
        assert!(!probe(PlatformFamily::Ios, "16.0").supports_rich_activity());
        assert!(!probe(PlatformFamily::Ios, "15").supports_rich_activity());
    }

    #[test]
    fn other_families_are_never_supported() {
        assert!(!probe(PlatformFamily::Android, "34").supports_rich_activity());
        assert!(!probe(PlatformFamily::Web, "17.0").supports_rich_activity());
        assert!(!probe(PlatformFamily::Desktop, "17.0").supports_rich_activity());
    }

    #[test]
    fn detection_failures_fail_closed() {
        assert!(!probe(PlatformFamily::Ios, "beta").supports_rich_activity());
        assert!(!probe(PlatformFamily::Ios, "").supports_rich_activity());
        let no_version = CapabilityProbe::new(
            PlatformIdentity {
                family: PlatformFamily::Ios,
                version: None,
            },
            "16.1",
        );
        assert!(!no_version.supports_rich_activity());
        let broken_minimum =
            CapabilityProbe::new(PlatformIdentity::new(PlatformFamily::Ios, "18.0"), "x");
        assert!(!broken_minimum.supports_rich_activity());
    }

    #[test]
    fn version_parsing_ignores_patch() {
        assert_eq!(
            "17.4.1".parse::<OsVersion>(),
            Ok(OsVersion {
                major: 17,
                minor: 4
            })
        );
        assert_eq!(
            "14".parse::<OsVersion>(),
            Ok(OsVersion {
                major: 14,
                minor: 0
            })
        );
    }
}
