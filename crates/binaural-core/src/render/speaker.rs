//! Virtual speakers, input layouts and channel maps

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Nominal spatial role of a virtual speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpeakerRole {
    #[serde(alias = "FL")]
    FrontLeft,
    #[serde(alias = "FR")]
    FrontRight,
    #[serde(alias = "FC", alias = "C")]
    FrontCenter,
    #[serde(alias = "LFE")]
    LowFrequency,
    #[serde(alias = "BL")]
    BackLeft,
    #[serde(alias = "BR")]
    BackRight,
    #[serde(alias = "SL")]
    SideLeft,
    #[serde(alias = "SR")]
    SideRight,
    #[serde(alias = "BC")]
    BackCenter,
}

impl SpeakerRole {
    /// Short label, e.g. "FL"
    pub fn short_name(&self) -> &'static str {
        match self {
            SpeakerRole::FrontLeft => "FL",
            SpeakerRole::FrontRight => "FR",
            SpeakerRole::FrontCenter => "FC",
            SpeakerRole::LowFrequency => "LFE",
            SpeakerRole::BackLeft => "BL",
            SpeakerRole::BackRight => "BR",
            SpeakerRole::SideLeft => "SL",
            SpeakerRole::SideRight => "SR",
            SpeakerRole::BackCenter => "BC",
        }
    }
}

impl std::fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// A speaker role bound to one input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualSpeaker {
    pub role: SpeakerRole,
    pub input_channel: usize,
}

/// Ordered virtual speakers; speaker `i` reads input channel `i`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputLayout {
    speakers: Vec<VirtualSpeaker>,
}

impl InputLayout {
    /// Build a layout from roles in input-channel order
    pub fn from_roles(roles: &[SpeakerRole]) -> Self {
        Self {
            speakers: roles
                .iter()
                .enumerate()
                .map(|(input_channel, &role)| VirtualSpeaker {
                    role,
                    input_channel,
                })
                .collect(),
        }
    }

    /// Default layout for a given number of input channels
    ///
    /// Counts above eight are treated as 7.1; extra channels are ignored.
    pub fn detect(channel_count: usize) -> Self {
        use SpeakerRole::*;
        let roles: &[SpeakerRole] = match channel_count {
            0 => &[],
            1 => &[FrontCenter],
            2 => &[FrontLeft, FrontRight],
            3 => &[FrontLeft, FrontRight, FrontCenter],
            4 => &[FrontLeft, FrontRight, BackLeft, BackRight],
            5 => &[FrontLeft, FrontRight, FrontCenter, BackLeft, BackRight],
            6 => &[FrontLeft, FrontRight, FrontCenter, LowFrequency, BackLeft, BackRight],
            7 => &[FrontLeft, FrontRight, FrontCenter, LowFrequency, BackCenter, SideLeft, SideRight],
            _ => &[
                FrontLeft,
                FrontRight,
                FrontCenter,
                LowFrequency,
                BackLeft,
                BackRight,
                SideLeft,
                SideRight,
            ],
        };
        Self::from_roles(roles)
    }

    pub fn speakers(&self) -> &[VirtualSpeaker] {
        &self.speakers
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }
}

/// Filter indices used for one speaker's left and right ear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarPair {
    pub left: usize,
    pub right: usize,
}

/// Maps speaker roles to ear filters of a filter set
///
/// Supplied as data together with the filter set; serialized as a YAML
/// mapping like `FL: { left: 0, right: 1 }`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap {
    entries: BTreeMap<SpeakerRole, EarPair>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map where the speaker at position `i` uses filters `2i` (left) and
    /// `2i + 1` (right), the usual interleaved HRIR file layout
    pub fn interleaved_pairs(roles: &[SpeakerRole]) -> Self {
        let mut map = Self::new();
        for (i, &role) in roles.iter().enumerate() {
            map.insert(
                role,
                EarPair {
                    left: 2 * i,
                    right: 2 * i + 1,
                },
            );
        }
        map
    }

    pub fn insert(&mut self, role: SpeakerRole, pair: EarPair) -> Option<EarPair> {
        self.entries.insert(role, pair)
    }

    pub fn get(&self, role: SpeakerRole) -> Option<EarPair> {
        self.entries.get(&role).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest filter index referenced by any entry
    pub fn max_filter_index(&self) -> Option<usize> {
        self.entries.values().map(|p| p.left.max(p.right)).max()
    }
}
