//! Operator-forced link parameters.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Result, TopologyError};
use crate::{LinkKey, NodeId};

/// One of the four overridable link parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum LinkField {
    Bandwidth,
    Latency,
    Jitter,
    PacketLoss,
}

impl LinkField {
    pub const ALL: [Self; 4] = [
        Self::Bandwidth,
        Self::Latency,
        Self::Jitter,
        Self::PacketLoss,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bandwidth => "bandwidth",
            Self::Latency => "latency",
            Self::Jitter => "jitter",
            Self::PacketLoss => "packet_loss",
        }
    }

    fn accepts(&self, value: i64) -> bool {
        match self {
            Self::PacketLoss => (0..=100).contains(&value),
            _ => value >= 0,
        }
    }
}

impl std::fmt::Display for LinkField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown link field {s:?}"))
    }
}

/// Partial record of forced link parameters. `None` falls back to the
/// distance-derived default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkOverride {
    #[cfg_attr(feature = "serde", serde(default))]
    pub bandwidth: Option<i64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub latency: Option<i64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub jitter: Option<i64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub packet_loss: Option<i64>,
}

impl LinkOverride {
    pub const fn get(&self, field: LinkField) -> Option<i64> {
        match field {
            LinkField::Bandwidth => self.bandwidth,
            LinkField::Latency => self.latency,
            LinkField::Jitter => self.jitter,
            LinkField::PacketLoss => self.packet_loss,
        }
    }

    pub fn set(&mut self, field: LinkField, value: Option<i64>) {
        let slot = match field {
            LinkField::Bandwidth => &mut self.bandwidth,
            LinkField::Latency => &mut self.latency,
            LinkField::Jitter => &mut self.jitter,
            LinkField::PacketLoss => &mut self.packet_loss,
        };
        *slot = value;
    }

    /// Builder for a single-field override.
    #[must_use]
    pub fn with(mut self, field: LinkField, value: i64) -> Self {
        self.set(field, Some(value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.active_fields().next().is_none()
    }

    /// Fields that currently carry a value.
    pub fn active_fields(&self) -> impl Iterator<Item = LinkField> + '_ {
        LinkField::ALL
            .into_iter()
            .filter(|field| self.get(*field).is_some())
    }

    /// Check every set field against its range.
    pub fn validate(&self) -> Result<()> {
        for field in LinkField::ALL {
            if let Some(value) = self.get(field) {
                if !field.accepts(value) {
                    return Err(TopologyError::InvalidOverride { field, value });
                }
            }
        }
        Ok(())
    }

    /// Copy every set field of `patch` over this record.
    fn merge(&mut self, patch: &LinkOverride) {
        for field in patch.active_fields() {
            self.set(field, patch.get(field));
        }
    }
}

/// Overrides keyed by unordered node pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideStore {
    links: BTreeMap<LinkKey, LinkOverride>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override for the link between `a` and `b`, in either order.
    pub fn get(&self, a: NodeId, b: NodeId) -> Option<&LinkOverride> {
        self.links.get(&LinkKey::new(a, b))
    }

    /// Set every field present in `patch`, leaving the others untouched.
    pub fn apply(&mut self, a: NodeId, b: NodeId, patch: &LinkOverride) -> Result<()> {
        if a == b {
            return Err(TopologyError::SelfLink(a));
        }
        patch.validate()?;
        if patch.is_empty() {
            return Ok(());
        }
        self.links
            .entry(LinkKey::new(a, b))
            .or_default()
            .merge(patch);
        Ok(())
    }

    /// Clear one field. Returns whether a value was removed.
    pub fn clear(&mut self, a: NodeId, b: NodeId, field: LinkField) -> bool {
        let key = LinkKey::new(a, b);
        let Some(entry) = self.links.get_mut(&key) else {
            return false;
        };
        let had_value = entry.get(field).is_some();
        entry.set(field, None);
        if entry.is_empty() {
            self.links.remove(&key);
        }
        had_value
    }

    /// Drop every override touching `id`.
    pub fn remove_node(&mut self, id: NodeId) -> usize {
        let before = self.links.len();
        self.links.retain(|key, _| !key.touches(id));
        before - self.links.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LinkKey, &LinkOverride)> {
        self.links.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
