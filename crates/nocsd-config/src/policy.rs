//! Toolkit version bands and the behaviour selected for each.
//!
//! The compatibility matrix is data, not code: the built-in table is parsed
//! from `policy.toml` and can be replaced with `GTK3_NOCSD_POLICY`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const BUILTIN_POLICY: &str = include_str!("policy.toml");

/// A `major.minor.micro` toolkit version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolkitVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl ToolkitVersion {
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }
}

impl fmt::Display for ToolkitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl FromStr for ToolkitVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidPolicy(format!("bad version {:?}", s));
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32, ConfigError> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(true)?;
        let micro = next(false)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(major, minor, micro))
    }
}

impl TryFrom<String> for ToolkitVersion {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ToolkitVersion> for String {
    fn from(v: ToolkitVersion) -> Self {
        v.to_string()
    }
}

/// How `gtk_window_set_titlebar()` is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TitlebarStrategy {
    /// Call the original setter while compositing is reported as unavailable.
    CompositeHack,
    /// Store the title bar through the probed private offset; use the
    /// composite hack when the probe is unavailable.
    DirectAssign,
}

/// How the header bar close button is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseButtonStrategy {
    /// Rewrite every request to "hidden".
    ForceHidden,
    /// Delegate unchanged, then strip window buttons from the layout.
    LayoutFixup,
}

/// Behaviour for one version band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandPolicy {
    pub min: ToolkitVersion,
    pub titlebar: TitlebarStrategy,
    pub close_button: CloseButtonStrategy,
    /// Bracket window realize and dialog construction with the
    /// composite-disable counter.
    pub composite_on_realize: bool,
    /// Hook header bar vtable slots and probe its decoration layout field.
    pub header_bar_fixups: bool,
}

/// Ordered list of version bands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    #[serde(rename = "band", default)]
    bands: Vec<BandPolicy>,
}

impl PolicyTable {
    /// The table shipped with the library.
    ///
    /// A table that fails to parse is replaced by an empty one, which never
    /// patches anything.
    pub fn builtin() -> Self {
        match Self::from_toml(BUILTIN_POLICY) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(component = "CONFIG", error = %e, "built-in policy table rejected");
                Self::default()
            }
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let table: PolicyTable = toml::from_str(contents)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bands.is_empty() {
            return Err(ConfigError::InvalidPolicy("no bands defined".into()));
        }
        for pair in self.bands.windows(2) {
            if pair[0].min >= pair[1].min {
                return Err(ConfigError::InvalidPolicy(format!(
                    "bands must be strictly ascending ({} then {})",
                    pair[0].min, pair[1].min
                )));
            }
        }
        Ok(())
    }

    pub fn bands(&self) -> &[BandPolicy] {
        &self.bands
    }

    pub fn band(&self, index: usize) -> Option<&BandPolicy> {
        self.bands.get(index)
    }

    /// Oldest supported version.
    pub fn minimum(&self) -> Option<ToolkitVersion> {
        self.bands.first().map(|b| b.min)
    }

    /// Index of the newest band the toolkit satisfies.
    ///
    /// `satisfies(v)` answers "is the running toolkit at least `v`"; it is
    /// asked from the newest band down and stops at the first yes.
    pub fn select(&self, mut satisfies: impl FnMut(ToolkitVersion) -> bool) -> Option<usize> {
        self.bands.iter().rposition(|band| satisfies(band.min))
    }

    /// Band selection for a known version.
    pub fn select_for(&self, version: ToolkitVersion) -> Option<usize> {
        self.select(|min| version >= min)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self { bands: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_parses() {
        let table = PolicyTable::from_toml(BUILTIN_POLICY).unwrap();
        assert_eq!(table.bands().len(), 3);
        assert_eq!(table.minimum(), Some(ToolkitVersion::new(3, 10, 0)));
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(
            "3.16.1".parse::<ToolkitVersion>().unwrap(),
            ToolkitVersion::new(3, 16, 1)
        );
        assert_eq!(
            "3.12".parse::<ToolkitVersion>().unwrap(),
            ToolkitVersion::new(3, 12, 0)
        );
        assert!("3".parse::<ToolkitVersion>().is_err());
        assert!("3.x.0".parse::<ToolkitVersion>().is_err());
        assert!("3.1.2.4".parse::<ToolkitVersion>().is_err());
    }

    #[test]
    fn test_band_selection() {
        let table = PolicyTable::builtin();
        assert_eq!(table.select_for(ToolkitVersion::new(3, 8, 9)), None);
        assert_eq!(table.select_for(ToolkitVersion::new(3, 10, 0)), Some(0));
        assert_eq!(table.select_for(ToolkitVersion::new(3, 14, 2)), Some(1));
        assert_eq!(table.select_for(ToolkitVersion::new(3, 16, 0)), Some(1));
        assert_eq!(table.select_for(ToolkitVersion::new(3, 16, 1)), Some(2));
        assert_eq!(table.select_for(ToolkitVersion::new(3, 24, 38)), Some(2));

        let newest = table.band(2).unwrap();
        assert_eq!(newest.titlebar, TitlebarStrategy::DirectAssign);
        assert!(!newest.composite_on_realize);
        let oldest = table.band(0).unwrap();
        assert_eq!(oldest.close_button, CloseButtonStrategy::ForceHidden);
        assert!(!oldest.header_bar_fixups);
    }

    #[test]
    fn test_selection_asks_newest_first_and_stops() {
        let table = PolicyTable::builtin();
        let mut asked = Vec::new();
        let picked = table.select(|v| {
            asked.push(v);
            v <= ToolkitVersion::new(3, 12, 0)
        });
        assert_eq!(picked, Some(1));
        assert_eq!(
            asked,
            vec![ToolkitVersion::new(3, 16, 1), ToolkitVersion::new(3, 12, 0)]
        );
    }

    #[test]
    fn test_rejects_unordered_bands() {
        let toml = r#"
[[band]]
min = "3.12.0"
titlebar = "composite-hack"
close_button = "layout-fixup"
composite_on_realize = true
header_bar_fixups = true

[[band]]
min = "3.10.0"
titlebar = "composite-hack"
close_button = "force-hidden"
composite_on_realize = true
header_bar_fixups = false
"#;
        assert!(matches!(
            PolicyTable::from_toml(toml),
            Err(ConfigError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_rejects_empty_table() {
        assert!(PolicyTable::from_toml("").is_err());
    }
}
