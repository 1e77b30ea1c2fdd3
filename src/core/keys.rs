//! Structured identity keys for derived artifacts.
//!
//! Every durable artifact in a drawer's output tree (tray crop, specimen
//! crop, mask, measurement row) is named by a composite key of the drawer
//! identifier, the tray index, and the specimen index. The key has a single
//! string form produced by [`RegionKey::to_string`] and parsed by
//! [`RegionKey::parse`]; components never split artifact filenames by hand.

use crate::core::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite identity of a region within a drawer.
///
/// A key always carries the drawer identifier; the tray and specimen indices
/// are present only at the corresponding depth. Indices are 1-based, assigned
/// by the spatial orderer, and durable: the same input detections always
/// yield the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionKey {
    /// Identifier of the drawer photograph, taken from the source file stem.
    pub drawer: String,
    /// 1-based tray index within the drawer, in reading order.
    pub tray: Option<u32>,
    /// 1-based specimen index within the tray, in reading order.
    pub specimen: Option<u32>,
}

impl RegionKey {
    /// Creates a drawer-level key.
    pub fn drawer(id: impl Into<String>) -> Self {
        Self {
            drawer: id.into(),
            tray: None,
            specimen: None,
        }
    }

    /// Derives the key of a tray within this drawer.
    pub fn tray(&self, index: u32) -> Self {
        Self {
            drawer: self.drawer.clone(),
            tray: Some(index),
            specimen: None,
        }
    }

    /// Derives the key of a specimen within this tray.
    ///
    /// Returns an error when called on a key that has no tray component,
    /// since a specimen index is meaningless outside a tray.
    pub fn specimen(&self, index: u32) -> Result<Self, PipelineError> {
        if self.tray.is_none() {
            return Err(PipelineError::invalid_input(format!(
                "cannot derive specimen key from drawer-level key '{}'",
                self
            )));
        }
        Ok(Self {
            drawer: self.drawer.clone(),
            tray: self.tray,
            specimen: Some(index),
        })
    }

    /// Returns the drawer-level key this key belongs to.
    pub fn drawer_key(&self) -> Self {
        Self::drawer(self.drawer.clone())
    }

    /// Returns the tray-level key this key belongs to, if any.
    pub fn tray_key(&self) -> Option<Self> {
        self.tray.map(|t| self.drawer_key().tray(t))
    }

    /// Parses a key from its canonical string form.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        let malformed = || PipelineError::KeyParse {
            value: value.to_string(),
        };

        let (head, specimen) = match value.rsplit_once("_spec-") {
            Some((head, digits)) => (head, Some(digits.parse::<u32>().map_err(|_| malformed())?)),
            None => (value, None),
        };
        let (drawer, tray) = match head.rsplit_once("_tray-") {
            Some((drawer, digits)) => (
                drawer,
                Some(digits.parse::<u32>().map_err(|_| malformed())?),
            ),
            None => (head, None),
        };
        if drawer.is_empty() || (specimen.is_some() && tray.is_none()) {
            return Err(malformed());
        }
        Ok(Self {
            drawer: drawer.to_string(),
            tray,
            specimen,
        })
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.drawer)?;
        if let Some(tray) = self.tray {
            write!(f, "_tray-{:02}", tray)?;
        }
        if let Some(specimen) = self.specimen {
            write!(f, "_spec-{:03}", specimen)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for RegionKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_encodes_depth() {
        let drawer = RegionKey::drawer("ento-2024-118");
        assert_eq!(drawer.to_string(), "ento-2024-118");

        let tray = drawer.tray(3);
        assert_eq!(tray.to_string(), "ento-2024-118_tray-03");

        let specimen = tray.specimen(7).unwrap();
        assert_eq!(specimen.to_string(), "ento-2024-118_tray-03_spec-007");
    }

    #[test]
    fn parse_round_trips() {
        for text in [
            "ento-2024-118",
            "ento-2024-118_tray-03",
            "ento-2024-118_tray-03_spec-007",
            "drawer_with_underscores_tray-12_spec-120",
        ] {
            let key = RegionKey::parse(text).unwrap();
            assert_eq!(key.to_string(), text);
        }
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        assert!(RegionKey::parse("").is_err());
        assert!(RegionKey::parse("_tray-01").is_err());
        assert!(RegionKey::parse("drawer_tray-xx").is_err());
        // A specimen index without a tray index is not addressable.
        assert!(RegionKey::parse("drawer_spec-001").is_err());
    }

    #[test]
    fn specimen_requires_tray() {
        let drawer = RegionKey::drawer("d");
        assert!(drawer.specimen(1).is_err());
        assert!(drawer.tray(1).specimen(1).is_ok());
    }

    #[test]
    fn tray_key_extraction() {
        let spec = RegionKey::drawer("d").tray(2).specimen(5).unwrap();
        assert_eq!(spec.tray_key().unwrap().to_string(), "d_tray-02");
        assert_eq!(spec.drawer_key().to_string(), "d");
    }
}
