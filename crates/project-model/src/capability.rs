//! Device/build capability tags.
//!
//! The capability query hands back plain string tags. They are parsed
//! into a closed enum here; anything unrecognized is dropped.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A feature the current device/build can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    ExportVideo,
    ExportFrames,
    BackgroundSync,
    ExportVideoH264,
    ExportVideoHevc,
    ExportVideoProres,
    ExportVideoVp8,
    ExportVideoVp9,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::ExportVideo,
        Capability::ExportFrames,
        Capability::BackgroundSync,
        Capability::ExportVideoH264,
        Capability::ExportVideoHevc,
        Capability::ExportVideoProres,
        Capability::ExportVideoVp8,
        Capability::ExportVideoVp9,
    ];

    /// Wire tag as reported by the capability query.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ExportVideo => "EXPORT_VIDEO",
            Capability::ExportFrames => "EXPORT_FRAMES",
            Capability::BackgroundSync => "BACKGROUND_SYNC",
            Capability::ExportVideoH264 => "EXPORT_VIDEO_H264",
            Capability::ExportVideoHevc => "EXPORT_VIDEO_HEVC",
            Capability::ExportVideoProres => "EXPORT_VIDEO_PRORES",
            Capability::ExportVideoVp8 => "EXPORT_VIDEO_VP8",
            Capability::ExportVideoVp9 => "EXPORT_VIDEO_VP9",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a tag is not one of the recognized capabilities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability tag: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str() == s.trim())
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// Capability snapshot taken at export time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse raw tags, skipping unknown ones.
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for tag in tags {
            match tag.as_ref().parse::<Capability>() {
                Ok(cap) => {
                    set.insert(cap);
                }
                Err(err) => tracing::warn!(error = %err, "Ignoring capability tag"),
            }
        }
        set
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Wire tags in a stable order.
    pub fn tags(&self) -> Vec<&'static str> {
        self.iter().map(Capability::as_str).collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tag_parses_back() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn test_unknown_tags_are_dropped() {
        let set = CapabilitySet::from_tags(["EXPORT_VIDEO", "TELEPORT", "export_frames", ""]);
        assert!(set.contains(Capability::ExportVideo));
        assert!(!set.contains(Capability::ExportFrames));
        assert_eq!(set.tags(), vec!["EXPORT_VIDEO"]);
    }

    #[test]
    fn test_serde_uses_wire_tags() {
        let json = serde_json::to_string(&Capability::ExportVideoProres).unwrap();
        assert_eq!(json, "\"EXPORT_VIDEO_PRORES\"");
    }
}
